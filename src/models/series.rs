use chrono::NaiveDate;

/// 单个交易日的观测值
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: i64,
    /// 前一交易日收盘价；没有更早数据时等于当日收盘价
    pub prior_close: f64,
    pub is_limit_up: bool,
}

/// 单只股票按日期升序排列、日期不重复的交易日序列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    sessions: Vec<Session>,
}

impl Series {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 调用方需保证 sessions 已按日期升序且无重复
    pub(crate) fn from_sorted(sessions: Vec<Session>) -> Self {
        debug_assert!(sessions.windows(2).all(|w| w[0].date < w[1].date));
        Self { sessions }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// 最近 k 个交易日（含最新一日）；不足 k 个时返回全部
    pub fn tail(&self, k: usize) -> &[Session] {
        let start = self.sessions.len().saturating_sub(k);
        &self.sessions[start..]
    }

    pub fn latest(&self) -> Option<&Session> {
        self.sessions.last()
    }
}
