// 公开导出的模块，供外部使用
pub mod models;
pub mod screening;
pub mod report;
pub mod errors;
pub mod config;

// 行情数据来源与取数服务，主程序和测试会直接使用
pub mod scrapers;
pub mod services;
#[doc(hidden)]
pub mod util;

// 重新导出常用类型，方便使用
pub use models::screen::{MatchRecord, ScreeningResult, SkippedSymbol};
pub use models::series::{Series, Session};
pub use models::stock::{DailyData, StockData, StockInfo};
pub use screening::screener::Screener;
pub use config::{Config, RetryPolicy, ScreenParams};
pub use errors::{Result, ScreenerError};
