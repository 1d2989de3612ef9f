//! 三个相互独立的选股条件。全部是只读的纯函数，窗口由调用方截取。

use crate::models::series::Session;

/// 窗口内是否出现过涨停
pub fn has_limit_up(window: &[Session]) -> bool {
    window.iter().any(|s| s.is_limit_up)
}

/// 窗口内涨停次数
pub fn count_limit_up(window: &[Session]) -> usize {
    window.iter().filter(|s| s.is_limit_up).count()
}

/// 最近 n 个交易日的涨幅(%)：(末日收盘 - 首日收盘) / 首日收盘 * 100
///
/// 交易日不足 n 个时定义为 0，而不是报错或缺失值。
pub fn n_session_return(sessions: &[Session], n: usize) -> f64 {
    if n == 0 || sessions.len() < n {
        return 0.0;
    }

    let window = &sessions[sessions.len() - n..];
    let first = window[0].close;
    let last = window[n - 1].close;
    if first <= 0.0 {
        return 0.0;
    }
    (last - first) / first * 100.0
}

/// 涨幅严格大于阈值
pub fn return_exceeds(return_pct: f64, threshold_pct: f64) -> bool {
    return_pct > threshold_pct
}

/// 当日相对前一日价跌且量缩
fn is_down_day(window: &[Session], i: usize) -> bool {
    window[i].close < window[i - 1].close && window[i].volume < window[i - 1].volume
}

/// 窗口内是否存在连续两天价跌量缩
///
/// 只在窗口内部比较，窗口第一天不与窗口外的前一日比较；不足 3 个交易日时为 false。
pub fn has_consecutive_decline_with_volume_contraction(window: &[Session]) -> bool {
    if window.len() < 3 {
        return false;
    }
    (1..window.len() - 1).any(|i| is_down_day(window, i) && is_down_day(window, i + 1))
}
