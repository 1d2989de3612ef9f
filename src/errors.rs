use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    ArrowError(String),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    #[error("Excel parsing error: {0}")]
    ExcelError(#[from] calamine::Error),

    /// 单只股票取数失败或无数据，只跳过该股票
    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// 启动时配置非法，整个筛选不会开始
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ScreenerError {
    pub fn unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        ScreenerError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScreenerError>;

// 用于从字符串创建错误
impl From<String> for ScreenerError {
    fn from(s: String) -> Self {
        ScreenerError::Unknown(s)
    }
}

// 用于从&str创建错误
impl From<&str> for ScreenerError {
    fn from(s: &str) -> Self {
        ScreenerError::Unknown(s.to_string())
    }
}
