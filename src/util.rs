use chrono::{Datelike, NaiveDate};
use crate::errors::{Result, ScreenerError};

// 日期转换工具
pub fn date_string_to_int(date_str: &str) -> Result<i32> {
    date_str.replace('-', "").parse::<i32>().map_err(|e| ScreenerError::DataError(e.to_string()))
}

pub fn naive_date_to_int(date: &NaiveDate) -> i32 {
    date.year() * 10000 + date.month() as i32 * 100 + date.day() as i32
}

pub fn int_to_naive_date(date_int: i32) -> Result<NaiveDate> {
    let date_str = date_int.to_string();
    if date_str.len() != 8 {
        return Err(ScreenerError::DataError(format!("Invalid date format: {}", date_str)));
    }

    let year = date_str[0..4].parse::<i32>()
        .map_err(|e| ScreenerError::DataError(e.to_string()))?;
    let month = date_str[4..6].parse::<u32>()
        .map_err(|e| ScreenerError::DataError(e.to_string()))?;
    let day = date_str[6..8].parse::<u32>()
        .map_err(|e| ScreenerError::DataError(e.to_string()))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| ScreenerError::DataError(format!("Invalid date: {}-{}-{}", year, month, day)))
}

/// 四舍五入到两位小数（分），恰好半分时远离零进位
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
