use crate::errors::Result;
use crate::models::stock::StockInfo;
use crate::services::fetcher::RetryingFetcher;
use chrono::NaiveDate;
use log::info;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 创业板代码前缀
pub const BOARD_PREFIXES: [&str; 2] = ["300", "301"];

pub fn is_board_symbol(symbol: &str) -> bool {
    BOARD_PREFIXES.iter().any(|prefix| symbol.starts_with(prefix))
}

/// 本次筛选的股票范围以及代码到名称的映射
#[derive(Debug, Clone, Default)]
pub struct Universe {
    stocks: Vec<StockInfo>,
    names: HashMap<String, String>,
}

impl Universe {
    /// 按板块前缀过滤，保持原顺序，重复代码只保留第一个。
    /// 名称为空的股票仍在范围内，只是查不到名称
    pub fn from_stock_list(list: Vec<StockInfo>) -> Self {
        let mut stocks = Vec::new();
        let mut names = HashMap::new();
        let mut seen = HashSet::new();

        for stock in list {
            if !is_board_symbol(&stock.symbol) || !seen.insert(stock.symbol.clone()) {
                continue;
            }
            let name = stock.name.trim();
            if !name.is_empty() {
                names.insert(stock.symbol.clone(), name.to_string());
            }
            stocks.push(stock);
        }

        Self { stocks, names }
    }

    pub fn stocks(&self) -> &[StockInfo] {
        &self.stocks
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.stocks.iter().map(|s| s.symbol.as_str())
    }

    /// 代码到名称的查找，筛选器用它生成 MatchRecord 的名称
    pub fn name_of(&self, symbol: &str) -> Option<&str> {
        self.names.get(symbol).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    /// 调试模式：只保留前 limit 只
    pub fn truncated(mut self, limit: usize) -> Self {
        if self.stocks.len() > limit {
            info!("DEBUG MODE: Processing only {} out of {} stocks", limit, self.stocks.len());
            for dropped in self.stocks.drain(limit..) {
                self.names.remove(&dropped.symbol);
            }
        }
        self
    }
}

/// 股票范围缓存：每个交易日刷新一次，也可以显式失效
#[derive(Default)]
pub struct UniverseCache {
    entry: RwLock<Option<(NaiveDate, Arc<Universe>)>>,
}

impl UniverseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 缓存的日期与 as_of 相同时直接返回，否则重新拉取
    pub async fn get_or_refresh(&self, fetcher: &RetryingFetcher, as_of: NaiveDate) -> Result<Arc<Universe>> {
        if let Some((date, universe)) = self.entry.read().await.as_ref() {
            if *date == as_of {
                return Ok(universe.clone());
            }
        }

        let mut entry = self.entry.write().await;
        // 等写锁期间可能已被其他调用刷新
        if let Some((date, universe)) = entry.as_ref() {
            if *date == as_of {
                return Ok(universe.clone());
            }
        }

        let list = fetcher.fetch_stock_list(&as_of).await?;
        let total = list.len();
        let universe = Arc::new(Universe::from_stock_list(list));
        info!(
            "创业板股票数量: {} (共 {} 支, 来源 {}, 日期 {})",
            universe.len(), total, fetcher.exchange_code(), as_of
        );

        *entry = Some((as_of, universe.clone()));
        Ok(universe)
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::models::stock::DailyData;
    use crate::scrapers::base::MarketDataSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn info(symbol: &str, name: &str) -> StockInfo {
        StockInfo { exchange: "SZSE".to_string(), symbol: symbol.to_string(), name: name.to_string() }
    }

    struct ListSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MarketDataSource for ListSource {
        fn exchange_code(&self) -> &'static str {
            "TEST"
        }

        async fn fetch_stock_list(&self, _date: &NaiveDate) -> Result<Vec<StockInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![info("300750", "宁德时代"), info("000001", "平安银行"), info("301236", "软通动力")])
        }

        async fn fetch_stock_history(&self, _symbol: &str, _since: &NaiveDate) -> Result<Vec<DailyData>> {
            Ok(vec![])
        }
    }

    #[test]
    fn filters_board_prefixes() {
        assert!(is_board_symbol("300750"));
        assert!(is_board_symbol("301236"));
        assert!(!is_board_symbol("000001"));
        assert!(!is_board_symbol("688981"));
        assert!(!is_board_symbol("302132"));
        assert!(!is_board_symbol("30"));
    }

    #[test]
    fn universe_keeps_order_and_names() {
        let universe = Universe::from_stock_list(vec![
            info("301236", "软通动力"),
            info("600000", "浦发银行"),
            info("300750", "宁德时代"),
            info("301236", "重复"),
            info("300001", " "),
        ]);

        assert_eq!(universe.symbols().collect::<Vec<_>>(), vec!["301236", "300750", "300001"]);
        assert_eq!(universe.name_of("301236"), Some("软通动力"));
        assert_eq!(universe.name_of("600000"), None);
        assert_eq!(universe.name_of("300001"), None);

        let truncated = universe.truncated(1);
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated.name_of("300750"), None);
    }

    #[tokio::test]
    async fn cache_refreshes_once_per_date() {
        let source = Arc::new(ListSource { calls: AtomicU32::new(0) });
        let fetcher = RetryingFetcher::new(source.clone(), RetryPolicy::immediate(1));
        let cache = UniverseCache::new();
        let day1 = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();

        let universe = cache.get_or_refresh(&fetcher, day1).await.unwrap();
        assert_eq!(universe.len(), 2);
        cache.get_or_refresh(&fetcher, day1).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        cache.get_or_refresh(&fetcher, day2).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        cache.invalidate().await;
        cache.get_or_refresh(&fetcher, day2).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }
}
