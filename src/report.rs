use crate::config::ScreenParams;
use crate::errors::{Result, ScreenerError};
use crate::models::screen::{MatchRecord, ScreeningResult};
use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use arrow_array::{BooleanArray, Float64Array, StringArray, UInt32Array};
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// 报表中的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub limit_up_count: usize,
    pub return_pct: f64,
    pub consecutive_decline: bool,
}

/// 固定列的筛选结果表
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub title: String,
    pub columns: [String; 6],
    pub rows: Vec<ReportRow>,
}

/// 报表标题，说明本次使用的条件
pub fn title(params: &ScreenParams) -> String {
    format!(
        "创业板,近{}日有涨停,近{}日涨幅>{}%,近{}日内连续两天价跌量缩的股票",
        params.limit_up_lookback, params.return_window, params.min_return_pct, params.decline_lookback
    )
}

/// 由匹配记录构建报表，保持筛选器输出的顺序
pub fn build(matches: &[MatchRecord], params: &ScreenParams) -> ReportTable {
    let columns = [
        "代码".to_string(),
        "名称".to_string(),
        "当前价".to_string(),
        format!("{}日涨停次数", params.limit_up_lookback),
        format!("{}日涨幅(%)", params.return_window),
        "连续价跌量缩".to_string(),
    ];

    let rows = matches.iter()
        .map(|m| ReportRow {
            symbol: m.symbol.clone(),
            name: m.name.clone(),
            price: m.latest_close,
            limit_up_count: m.limit_up_count,
            return_pct: m.return_pct,
            consecutive_decline: m.consecutive_decline,
        })
        .collect();

    ReportTable { title: title(params), columns, rows }
}

impl ReportTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn cells(row: &ReportRow) -> [String; 6] {
        [
            row.symbol.clone(),
            row.name.clone(),
            format!("{:.2}", row.price),
            row.limit_up_count.to_string(),
            format!("{:.2}", row.return_pct),
            if row.consecutive_decline { "是" } else { "否" }.to_string(),
        ]
    }

    /// 保存为 JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// 保存为 Arrow IPC 文件
    pub fn save_arrow<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("symbol", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("price", DataType::Float64, false),
            Field::new("limit_up_count", DataType::UInt32, false),
            Field::new("return_pct", DataType::Float64, false),
            Field::new("consecutive_decline", DataType::Boolean, false),
        ]));

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(self.rows.iter().map(|r| r.symbol.as_str()))),
            Arc::new(StringArray::from_iter_values(self.rows.iter().map(|r| r.name.as_str()))),
            Arc::new(Float64Array::from_iter_values(self.rows.iter().map(|r| r.price))),
            Arc::new(UInt32Array::from_iter_values(self.rows.iter().map(|r| r.limit_up_count as u32))),
            Arc::new(Float64Array::from_iter_values(self.rows.iter().map(|r| r.return_pct))),
            Arc::new(BooleanArray::from(self.rows.iter().map(|r| r.consecutive_decline).collect::<Vec<_>>())),
        ];

        let batch = RecordBatch::try_new(schema.clone(), columns)
            .map_err(|e| ScreenerError::ArrowError(e.to_string()))?;

        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, &schema)
            .map_err(|e| ScreenerError::ArrowError(e.to_string()))?;
        writer.write(&batch)
            .map_err(|e| ScreenerError::ArrowError(e.to_string()))?;
        writer.finish()
            .map_err(|e| ScreenerError::ArrowError(e.to_string()))?;
        Ok(())
    }

    /// 按扩展名选择输出格式（.json 或 .arrow）
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.save_json(path),
            Some("arrow") => self.save_arrow(path),
            _ => Err(ScreenerError::DataError(format!(
                "Unsupported report format: {} (use .json or .arrow)",
                path.display()
            ))),
        }
    }
}

impl fmt::Display for ReportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "Empty result\nColumns: [{}]", self.columns.join(", "));
        }

        let cells: Vec<[String; 6]> = self.rows.iter().map(Self::cells).collect();
        let mut widths = [0usize; 6];
        for (i, column) in self.columns.iter().enumerate() {
            widths[i] = column.chars().count();
        }
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let header: Vec<String> = self.columns.iter()
            .enumerate()
            .map(|(i, c)| format!("{:>width$}", c, width = widths[i]))
            .collect();
        write!(f, "{}", header.join("  "))?;

        for row in &cells {
            let line: Vec<String> = row.iter()
                .enumerate()
                .map(|(i, c)| format!("{:>width$}", c, width = widths[i]))
                .collect();
            write!(f, "\n{}", line.join("  "))?;
        }
        Ok(())
    }
}

/// 把一次筛选的结果写入日志
pub fn log_result(table: &ReportTable, result: &ScreeningResult) {
    info!("{}:\n{}", table.title, table);

    for skipped in &result.skipped {
        warn!("Skipped {}: {}", skipped.symbol, skipped.reason);
    }
    if result.cancelled {
        warn!("Result is partial: screening was cancelled after {} stocks", result.scanned);
    }
    info!(
        "Scanned {} stocks, {} matched, {} skipped",
        result.scanned,
        table.rows.len(),
        result.skipped.len()
    );
}
