use crate::errors::{Result, ScreenerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 选股条件参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenParams {
    /// 涨停回看交易日数
    pub limit_up_lookback: usize,
    /// 涨幅计算窗口
    pub return_window: usize,
    /// 涨幅阈值(%)，严格大于才算满足
    pub min_return_pct: f64,
    /// 连续价跌量缩回看交易日数
    pub decline_lookback: usize,
    /// 涨停幅度，创业板简化为固定 10%
    pub limit_up_rate: f64,
}

impl Default for ScreenParams {
    fn default() -> Self {
        Self {
            limit_up_lookback: 60,
            return_window: 15,
            min_return_pct: 10.0,
            decline_lookback: 3,
            limit_up_rate: 0.10,
        }
    }
}

/// 取数重试策略：指数退避，限定次数和总时长
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    #[serde(rename = "attempt_timeout_ms", with = "duration_ms")]
    pub attempt_timeout: Duration,
    #[serde(rename = "total_timeout_ms", with = "duration_ms")]
    pub total_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(30),
            total_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// 无等待的重试策略，测试用
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workers: usize,
    /// 每只股票保留的交易日数
    pub history_days: usize,
    pub debug_mode: bool,
    pub debug_stock_limit: usize,
    pub screen: ScreenParams,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            workers: 8,
            history_days: 60,
            debug_mode: false,
            debug_stock_limit: 10,
            screen: ScreenParams::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// 从 JSON 文件加载配置，缺失字段取默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScreenerError::ConfigurationInvalid(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ScreenerError::ConfigurationInvalid(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_history_days(mut self, days: usize) -> Self {
        self.history_days = days;
        self
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_debug_stock_limit(mut self, limit: usize) -> Self {
        self.debug_stock_limit = limit;
        self
    }

    pub fn with_limit_up_lookback(mut self, days: usize) -> Self {
        self.screen.limit_up_lookback = days;
        self
    }

    pub fn with_return_window(mut self, days: usize) -> Self {
        self.screen.return_window = days;
        self
    }

    pub fn with_min_return_pct(mut self, pct: f64) -> Self {
        self.screen.min_return_pct = pct;
        self
    }

    pub fn with_decline_lookback(mut self, days: usize) -> Self {
        self.screen.decline_lookback = days;
        self
    }

    pub fn with_limit_up_rate(mut self, rate: f64) -> Self {
        self.screen.limit_up_rate = rate;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 检查配置是否合法，非法配置在启动时直接报错
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ScreenerError::ConfigurationInvalid(msg));
        let screen = &self.screen;

        if self.workers == 0 {
            return invalid("workers must be at least 1".to_string());
        }
        if screen.limit_up_lookback == 0 {
            return invalid("limit_up_lookback must be at least 1".to_string());
        }
        if screen.return_window < 2 {
            return invalid(format!("return_window must be at least 2, got {}", screen.return_window));
        }
        if screen.decline_lookback < 3 {
            return invalid(format!("decline_lookback must be at least 3, got {}", screen.decline_lookback));
        }
        let longest = screen.limit_up_lookback
            .max(screen.return_window)
            .max(screen.decline_lookback);
        if self.history_days < longest {
            return invalid(format!(
                "history_days ({}) is shorter than the longest window ({})",
                self.history_days, longest
            ));
        }
        if !screen.min_return_pct.is_finite() {
            return invalid("min_return_pct must be a finite number".to_string());
        }
        if !(screen.limit_up_rate > 0.0 && screen.limit_up_rate <= 1.0) {
            return invalid(format!("limit_up_rate must be in (0, 1], got {}", screen.limit_up_rate));
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.attempt_timeout.is_zero() || self.retry.total_timeout.is_zero() {
            return invalid("retry timeouts must be non-zero".to_string());
        }
        Ok(())
    }
}
