use serde::{Deserialize, Serialize};

/// 日线数据结构（与 DataHub stock.arrow 的 daily 字段一致）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyData {
    pub date: i32,  // YYYYMMDD
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: i64,
    pub amount: i64,
}

/// Stock data structure with nested daily data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockData {
    pub exchange: String,
    pub symbol: String,
    pub name: String,
    pub daily: Vec<DailyData>,
}

/// 股票基本信息（代码 + 名称），用于构建选股范围
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInfo {
    pub exchange: String,
    pub symbol: String,
    pub name: String,
}

impl From<&StockData> for StockInfo {
    fn from(stock: &StockData) -> Self {
        Self {
            exchange: stock.exchange.clone(),
            symbol: stock.symbol.clone(),
            name: stock.name.clone(),
        }
    }
}
