use serde::Serialize;

/// 满足全部条件的股票，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub symbol: String,
    pub name: String,
    pub latest_close: f64,
    pub limit_up_count: usize,
    /// 近N日涨幅(%)，保留两位小数
    pub return_pct: f64,
    pub consecutive_decline: bool,
}

/// 被跳过的股票及原因
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

/// 一次筛选的结果。按选股范围的顺序排列，与 worker 完成顺序无关
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScreeningResult {
    pub scanned: usize,
    pub matches: Vec<MatchRecord>,
    pub skipped: Vec<SkippedSymbol>,
    /// 被中途取消时为 true，此时结果只包含已完成的股票
    pub cancelled: bool,
}
