use crate::models::stock::{DailyData, StockInfo};
use crate::scrapers::base::MarketDataSource;
use crate::errors::{Result, ScreenerError};
use crate::util;
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Reader, DataType};
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SNAPSHOT_URL: &str = "https://www.szse.cn/api/report/ShowReport";
const HISTORY_URL: &str = "https://www.szse.cn/api/market/ssjjhq/getHistoryData";

/// 深圳证券交易所数据抓取器（创业板 300/301 均在深交所上市）
pub struct SZSEScraper {
    client: Client,
    request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl SZSEScraper {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ScreenerError::RequestError)?;

        Ok(Self {
            client,
            request_interval: Duration::from_millis(500),
            last_request: Mutex::new(None),
        })
    }

    // 所有 worker 共用同一个抓取器，这里统一限速
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(time) = *last {
            let elapsed = time.elapsed();
            if elapsed < self.request_interval {
                let wait = self.request_interval - elapsed;
                debug!("等待 {:?} 以遵守频率限制", wait);
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// 证券代码单元格，数值型代码补齐为 6 位
fn cell_to_code(cell: &DataType) -> Option<String> {
    match cell {
        DataType::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        DataType::Float(f) => Some(format!("{:06}", *f as i64)),
        DataType::Int(i) => Some(format!("{:06}", i)),
        _ => None,
    }
}

/// 行情接口里的数字有时是字符串，有时是数值
fn value_to_f32(value: &Value) -> Option<f32> {
    match value {
        Value::String(s) => s.replace(',', "").parse::<f32>().ok(),
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.replace(',', "").parse::<f64>().ok().map(|v| v.round() as i64),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v.round() as i64)),
        _ => None,
    }
}

/// 解析历史K线 JSON，只保留 since 及之后的交易日
pub(crate) fn parse_history(json: &Value, since: &NaiveDate) -> Result<Vec<DailyData>> {
    let since_int = util::naive_date_to_int(since);
    let mut daily_data = Vec::new();

    let rows = match json.get("data").and_then(|d| d.get("picupdata")).and_then(|d| d.as_array()) {
        Some(rows) => rows,
        None => return Ok(daily_data),
    };

    // [日期, 开盘, 收盘, 最低, 最高, 涨跌, 涨幅, 成交量(手), 成交额]
    for item in rows {
        let array = match item.as_array() {
            Some(array) if array.len() >= 9 => array,
            _ => continue,
        };

        let date = match array[0].as_str().map(util::date_string_to_int) {
            Some(Ok(date)) => date,
            _ => {
                debug!("跳过日期无效的K线: {}", array[0]);
                continue;
            }
        };
        if date < since_int {
            continue;
        }

        let (open, close, low, high) = match (
            value_to_f32(&array[1]),
            value_to_f32(&array[2]),
            value_to_f32(&array[3]),
            value_to_f32(&array[4]),
        ) {
            (Some(open), Some(close), Some(low), Some(high)) => (open, close, low, high),
            _ => continue,
        };

        daily_data.push(DailyData {
            date,
            open,
            high,
            low,
            close,
            volume: value_to_i64(&array[7]).unwrap_or_default() * 100,
            amount: value_to_i64(&array[8]).unwrap_or_default(),
        });
    }

    // 按日期降序排序
    daily_data.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(daily_data)
}

#[async_trait]
impl MarketDataSource for SZSEScraper {
    fn exchange_code(&self) -> &'static str {
        "SZSE"
    }

    async fn fetch_stock_list(&self, date: &NaiveDate) -> Result<Vec<StockInfo>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        info!("开始获取深交所股票列表，日期: {}", date_str);

        self.wait_for_rate_limit().await;

        let response = self.client
            .get(SNAPSHOT_URL)
            .query(&[
                ("SHOWTYPE", "xlsx"),
                ("CATALOGID", "1815_stock_snapshot"),
                ("txtBeginDate", date_str.as_str()),
                ("txtEndDate", date_str.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;

        let mut workbook = open_workbook_auto_from_rs(std::io::Cursor::new(bytes))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ScreenerError::DataError("XLSX文件中没有工作表".to_string()))??;

        let mut stocks = Vec::new();

        // 跳过表头行：[交易日期, 证券代码, 证券简称, ...]
        for row in range.rows().skip(1) {
            let code = match row.get(1).and_then(cell_to_code) {
                Some(code) => code,
                None => continue,
            };
            let name = match row.get(2) {
                Some(cell) => cell.to_string().trim().to_string(),
                None => continue,
            };

            stocks.push(StockInfo {
                exchange: self.exchange_code().to_string(),
                symbol: code,
                name,
            });
        }

        info!("成功获取 {} 的 {} 支股票信息", date_str, stocks.len());
        Ok(stocks)
    }

    async fn fetch_stock_history(&self, symbol: &str, since: &NaiveDate) -> Result<Vec<DailyData>> {
        debug!("开始获取深交所股票{}的历史数据", symbol);

        self.wait_for_rate_limit().await;

        let response = self.client
            .get(HISTORY_URL)
            .query(&[("cycleType", "32"), ("marketId", "1"), ("code", symbol)])
            .send()
            .await?
            .error_for_status()?;

        let json: Value = response.json().await?;
        let daily_data = parse_history(&json, since)?;

        debug!("{} 获取到 {} 条K线记录", symbol, daily_data.len());
        Ok(daily_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_history_rows_and_filters_by_date() {
        let payload = json!({
            "data": {
                "picupdata": [
                    ["2025-01-02", "10.00", "10.50", "9.90", "10.60", "0.50", "5.00", 1200, 1260000.0],
                    ["2025-01-03", "10.50", "11.55", "10.40", "11.55", "1.05", "10.00", 3400, 3900000.0],
                    ["2024-12-31", "9.80", "10.00", "9.70", "10.10", "0.20", "2.04", 800, 800000.0],
                    ["bad row"]
                ]
            }
        });
        let since = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let rows = parse_history(&payload, &since).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, 20250103);
        assert_eq!(rows[0].close, 11.55);
        assert_eq!(rows[0].volume, 340000);
        assert_eq!(rows[1].date, 20250102);
        assert_eq!(rows[1].high, 10.6);
    }

    #[test]
    fn malformed_date_skips_only_that_row() {
        let payload = json!({
            "data": {
                "picupdata": [
                    ["2025-01-0x", "10.00", "10.50", "9.90", "10.60", "0.50", "5.00", 1200, 1260000.0],
                    [20250106, "10.50", "11.00", "10.40", "11.10", "0.50", "4.76", 900, 990000.0],
                    ["2025-01-07", "11.00", "11.20", "10.90", "11.30", "0.20", "1.82", 1000, 1120000.0]
                ]
            }
        });
        let since = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let rows = parse_history(&payload, &since).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, 20250107);
        assert_eq!(rows[0].close, 11.2);
    }

    #[test]
    fn missing_payload_yields_no_rows() {
        let since = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(parse_history(&json!({ "data": null }), &since).unwrap().is_empty());
    }

    #[test]
    fn numeric_codes_are_zero_padded() {
        assert_eq!(cell_to_code(&DataType::Float(300750.0)).as_deref(), Some("300750"));
        assert_eq!(cell_to_code(&DataType::Int(2594)).as_deref(), Some("002594"));
        assert_eq!(cell_to_code(&DataType::Empty), None);
    }
}
