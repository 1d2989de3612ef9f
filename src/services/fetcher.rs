use crate::config::RetryPolicy;
use crate::errors::{Result, ScreenerError};
use crate::models::stock::{DailyData, StockInfo};
use crate::scrapers::base::MarketDataSource;
use chrono::NaiveDate;
use log::warn;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// 指数退避：第 k 次重试前等待 min(initial * 2^k, max)
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    pub fn next_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.current_attempt.min(16));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    pub async fn sleep(&mut self, what: &str) -> std::result::Result<(), MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let delay = self.next_delay();
        warn!(
            "{}: retry attempt {} of {} in {:?}",
            what,
            self.current_attempt + 1,
            self.max_retries,
            delay
        );

        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.current_attempt += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// 带重试和超时的行情数据访问
///
/// 重试策略只在这一层，筛选器本身不做重试。
pub struct RetryingFetcher {
    source: Arc<dyn MarketDataSource + Send + Sync>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(source: Arc<dyn MarketDataSource + Send + Sync>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn exchange_code(&self) -> &'static str {
        self.source.exchange_code()
    }

    pub async fn fetch_stock_list(&self, date: &NaiveDate) -> Result<Vec<StockInfo>> {
        let what = format!("{} stock list", self.source.exchange_code());
        self.with_retry(&what, move || self.source.fetch_stock_list(date)).await
    }

    pub async fn fetch_history(&self, symbol: &str, since: &NaiveDate) -> Result<Vec<DailyData>> {
        self.with_retry(symbol, move || self.source.fetch_stock_history(symbol, since)).await
    }

    /// 每次尝试受 attempt_timeout 限制，整个过程（含等待）受 total_timeout 限制。
    /// 源本身返回的 DataUnavailable 不重试。
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.policy;
        let attempts = async {
            let mut backoff = ExponentialBackoff::new(
                policy.initial_delay,
                policy.max_delay,
                policy.max_attempts.saturating_sub(1),
            );

            loop {
                let error = match timeout(policy.attempt_timeout, op()).await {
                    Ok(Ok(value)) => return Ok(value),
                    Ok(Err(e @ ScreenerError::DataUnavailable { .. })) => return Err(e),
                    Ok(Err(e)) => e,
                    Err(_) => ScreenerError::Timeout(policy.attempt_timeout),
                };

                warn!("{}: fetch failed: {}", what, error);
                if backoff.sleep(what).await.is_err() {
                    return Err(ScreenerError::unavailable(
                        what,
                        format!("{} attempt(s) failed, last error: {}", policy.max_attempts, error),
                    ));
                }
            }
        };

        match timeout(policy.total_timeout, attempts).await {
            Ok(result) => result,
            Err(_) => Err(ScreenerError::unavailable(
                what,
                ScreenerError::Timeout(policy.total_timeout).to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 前 failures 次调用失败，之后成功
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
        hang: bool,
    }

    impl FlakySource {
        fn new(failures: u32) -> Self {
            Self { failures, calls: AtomicU32::new(0), hang: false }
        }

        fn hanging() -> Self {
            Self { failures: 0, calls: AtomicU32::new(0), hang: true }
        }
    }

    #[async_trait]
    impl MarketDataSource for FlakySource {
        fn exchange_code(&self) -> &'static str {
            "TEST"
        }

        async fn fetch_stock_list(&self, _date: &NaiveDate) -> Result<Vec<StockInfo>> {
            Ok(vec![])
        }

        async fn fetch_stock_history(&self, symbol: &str, _since: &NaiveDate) -> Result<Vec<DailyData>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if symbol == "missing" {
                return Err(ScreenerError::unavailable(symbol, "unknown symbol"));
            }
            if call < self.failures {
                return Err(ScreenerError::DataError(format!("transient failure {}", call)));
            }
            Ok(vec![DailyData { date: 20250102, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1, amount: 1 }])
        }
    }

    fn since() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(5), 3);
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        backoff.current_attempt = 1;
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        backoff.current_attempt = 2;
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let source = Arc::new(FlakySource::new(2));
        let fetcher = RetryingFetcher::new(source.clone(), RetryPolicy::immediate(3));

        let rows = fetcher.fetch_history("300001", &since()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let source = Arc::new(FlakySource::new(10));
        let fetcher = RetryingFetcher::new(source.clone(), RetryPolicy::immediate(3));

        let err = fetcher.fetch_history("300001", &since()).await.unwrap_err();
        assert!(matches!(err, ScreenerError::DataUnavailable { .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unavailable_is_not_retried() {
        let source = Arc::new(FlakySource::new(0));
        let fetcher = RetryingFetcher::new(source.clone(), RetryPolicy::immediate(5));

        assert!(fetcher.fetch_history("missing", &since()).await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hanging_source_times_out() {
        let source = Arc::new(FlakySource::hanging());
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_millis(5),
            ..RetryPolicy::immediate(2)
        };
        let fetcher = RetryingFetcher::new(source.clone(), policy);

        let err = fetcher.fetch_history("300001", &since()).await.unwrap_err();
        assert!(matches!(err, ScreenerError::DataUnavailable { .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
