use crate::models::stock::{DailyData, StockInfo};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// 行情数据来源
#[async_trait]
pub trait MarketDataSource {
    /// Get the exchange code this source is for
    fn exchange_code(&self) -> &'static str;

    /// Fetch stock list (code + name) as of the given date
    async fn fetch_stock_list(&self, date: &NaiveDate) -> Result<Vec<StockInfo>>;

    /// Fetch daily history for a specific stock, from `since` (inclusive) onwards.
    /// Rows may come in any order.
    async fn fetch_stock_history(&self, symbol: &str, since: &NaiveDate) -> Result<Vec<DailyData>>;
}
