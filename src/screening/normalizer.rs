use crate::errors::{Result, ScreenerError};
use crate::models::series::{Series, Session};
use crate::models::stock::DailyData;
use crate::services::fetcher::RetryingFetcher;
use crate::util;
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 收盘价不低于 round(前收 * (1 + rate), 2) 即视为涨停，边界含等于
pub fn is_limit_up(close: f64, prior_close: f64, rate: f64) -> bool {
    close >= util::round2(prior_close * (1.0 + rate))
}

/// 请求 days 个交易日时向前取的自然日起点（2 倍，扣除非交易日后仍够用）
pub fn history_start(as_of: NaiveDate, days: usize) -> NaiveDate {
    as_of - chrono::Duration::days(2 * days as i64)
}

/// 原始日线 -> 规范化序列
///
/// 行可以任意顺序，重复日期以后出现的为准，日期非法或收盘价非正的行被丢弃。
/// 前收在完整的原始窗口上计算后再截取最近 `days` 个交易日，
/// 所以截取后的第一天仍使用真实的前一日收盘价；完全没有更早数据时等于自身收盘价。
pub fn normalize(rows: &[DailyData], days: usize, limit_up_rate: f64) -> Series {
    let mut by_date: BTreeMap<NaiveDate, (f64, i64)> = BTreeMap::new();

    for row in rows {
        let date = match util::int_to_naive_date(row.date) {
            Ok(date) => date,
            Err(e) => {
                debug!("Dropping row with bad date {}: {}", row.date, e);
                continue;
            }
        };
        let close = util::round2(row.close as f64);
        if !close.is_finite() || close <= 0.0 {
            debug!("Dropping row {} with non-positive close {}", row.date, row.close);
            continue;
        }
        by_date.insert(date, (close, row.volume.max(0)));
    }

    let mut sessions = Vec::with_capacity(by_date.len());
    let mut previous: Option<f64> = None;

    for (date, (close, volume)) in by_date {
        let prior_close = previous.unwrap_or(close);
        sessions.push(Session {
            date,
            close,
            volume,
            prior_close,
            is_limit_up: is_limit_up(close, prior_close, limit_up_rate),
        });
        previous = Some(close);
    }

    let start = sessions.len().saturating_sub(days);
    Series::from_sorted(sessions.split_off(start))
}

/// 通过行情数据源加载单只股票的序列
pub struct SeriesLoader {
    fetcher: Arc<RetryingFetcher>,
    days: usize,
    limit_up_rate: f64,
}

impl SeriesLoader {
    pub fn new(fetcher: Arc<RetryingFetcher>, days: usize, limit_up_rate: f64) -> Self {
        Self { fetcher, days, limit_up_rate }
    }

    /// 取数失败或无数据时返回 DataUnavailable，调用方据此跳过该股票
    pub async fn try_load(&self, symbol: &str, as_of: NaiveDate) -> Result<Series> {
        let since = history_start(as_of, self.days);
        let as_of_int = util::naive_date_to_int(&as_of);

        let rows: Vec<DailyData> = self.fetcher
            .fetch_history(symbol, &since)
            .await?
            .into_iter()
            .filter(|row| row.date <= as_of_int)
            .collect();

        if rows.is_empty() {
            return Err(ScreenerError::unavailable(symbol, format!("no rows since {}", since)));
        }

        let series = normalize(&rows, self.days, self.limit_up_rate);
        if series.is_empty() {
            return Err(ScreenerError::unavailable(symbol, "no valid rows"));
        }
        Ok(series)
    }

    /// 同 try_load，但失败时返回空序列而不是错误
    pub async fn load(&self, symbol: &str, as_of: NaiveDate) -> Series {
        match self.try_load(symbol, as_of).await {
            Ok(series) => series,
            Err(e) => {
                warn!("{}: {}", symbol, e);
                Series::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: i32, close: f32, volume: i64) -> DailyData {
        DailyData { date, open: close, high: close, low: close, close, volume, amount: 0 }
    }

    #[test]
    fn limit_up_boundary_is_inclusive() {
        assert!(is_limit_up(11.0, 10.0, 0.10));
        assert!(is_limit_up(13.57, 12.34, 0.10));
        assert!(!is_limit_up(13.56, 12.34, 0.10));
        assert!(is_limit_up(12.0, 10.0, 0.20));
        assert!(!is_limit_up(11.99, 10.0, 0.20));
    }

    #[test]
    fn limit_price_rounds_half_up_to_cents() {
        // 4.55 * 1.1 = 5.005，按交易所规则进位到 5.01
        assert_eq!(util::round2(4.55 * 1.1), 5.01);
        assert!(!is_limit_up(5.00, 4.55, 0.10));
        assert!(is_limit_up(5.01, 4.55, 0.10));
    }

    #[test]
    fn limit_up_survives_f32_prices() {
        // 12.34 * 1.1 = 13.574 -> 13.57；f32 的 13.57 需先规整到分
        let series = normalize(&[row(20250102, 12.34, 100), row(20250103, 13.57, 200)], 60, 0.10);
        assert!(series.sessions()[1].is_limit_up);
    }

    #[test]
    fn sorts_dedups_and_links_prior_close() {
        let rows = vec![
            row(20250106, 12.0, 300),
            row(20250102, 10.0, 100),
            row(20250103, 11.0, 200),
            row(20250103, 10.5, 250),
            row(20250107, 0.0, 10),
            row(2025011, 9.0, 10),
        ];
        let series = normalize(&rows, 60, 0.10);
        let sessions = series.sessions();

        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[0].date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(sessions[0].prior_close, 10.0);
        assert_eq!(sessions[1].close, 10.5);
        assert_eq!(sessions[1].volume, 250);
        assert_eq!(sessions[1].prior_close, 10.0);
        assert_eq!(sessions[2].prior_close, 10.5);
        assert!(!sessions[0].is_limit_up);
        assert!(sessions[2].is_limit_up);
    }

    #[test]
    fn trims_after_computing_prior_close() {
        let rows: Vec<DailyData> = (1..=5).map(|d| row(20250100 + d, 10.0 + d as f32, 100)).collect();
        let series = normalize(&rows, 3, 0.10);

        assert_eq!(series.len(), 3);
        assert_eq!(series.sessions()[0].close, 13.0);
        assert_eq!(series.sessions()[0].prior_close, 12.0);
    }

    #[test]
    fn empty_input_gives_empty_series() {
        assert!(normalize(&[], 60, 0.10).is_empty());
    }

    #[test]
    fn history_start_doubles_calendar_days() {
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(history_start(as_of, 60), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
    }
}
