use crate::models::stock::{DailyData, StockData, StockInfo};
use crate::scrapers::base::MarketDataSource;
use crate::errors::{Result, ScreenerError};
use crate::util;
use arrow::array::{ArrayRef, StringBuilder};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use arrow_array::{Array, Float32Array, Int32Array, Int64Array, ListArray, StringArray, StructArray};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// 离线数据源：读取 DataHub 格式的 stock.arrow 快照
pub struct ArrowFileSource {
    data: Vec<StockData>,
    symbol_index: HashMap<String, usize>,
}

impl ArrowFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading stock snapshot from {}", path.display());
        let data = read_stock_data(File::open(path)?)?;
        Ok(Self::from_data(data))
    }

    pub fn from_data(data: Vec<StockData>) -> Self {
        let symbol_index = data.iter()
            .enumerate()
            .map(|(i, stock)| (stock.symbol.clone(), i))
            .collect();
        Self { data, symbol_index }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 快照中最新的交易日期
    pub fn latest_trading_date(&self) -> Option<NaiveDate> {
        self.data.iter()
            .flat_map(|stock| stock.daily.iter().map(|d| d.date))
            .max()
            .and_then(|date| util::int_to_naive_date(date).ok())
    }

    /// 保存为 DataHub 兼容的 Arrow 文件
    pub fn save<P: AsRef<Path>>(data: &[StockData], path: P) -> Result<()> {
        let batch = stock_data_to_record_batch(data)?;
        let file = File::create(path)?;

        let mut writer = FileWriter::try_new(file, &batch.schema())
            .map_err(|e| ScreenerError::ArrowError(e.to_string()))?;
        writer.write(&batch)
            .map_err(|e| ScreenerError::ArrowError(e.to_string()))?;
        writer.finish()
            .map_err(|e| ScreenerError::ArrowError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MarketDataSource for ArrowFileSource {
    fn exchange_code(&self) -> &'static str {
        "ARROW"
    }

    async fn fetch_stock_list(&self, _date: &NaiveDate) -> Result<Vec<StockInfo>> {
        Ok(self.data.iter().map(StockInfo::from).collect())
    }

    async fn fetch_stock_history(&self, symbol: &str, since: &NaiveDate) -> Result<Vec<DailyData>> {
        let stock = self.symbol_index.get(symbol)
            .map(|&idx| &self.data[idx])
            .ok_or_else(|| ScreenerError::unavailable(symbol, "not in snapshot"))?;

        let since_int = util::naive_date_to_int(since);
        Ok(stock.daily.iter().filter(|d| d.date >= since_int).cloned().collect())
    }
}

fn daily_fields() -> Fields {
    Fields::from(vec![
        Field::new("date", DataType::Int32, false),
        Field::new("open", DataType::Float32, false),
        Field::new("high", DataType::Float32, false),
        Field::new("low", DataType::Float32, false),
        Field::new("close", DataType::Float32, false),
        Field::new("volume", DataType::Int64, false),
        Field::new("amount", DataType::Int64, false),
    ])
}

fn stock_data_to_record_batch(data: &[StockData]) -> Result<RecordBatch> {
    let mut exchange_builder = StringBuilder::new();
    let mut symbol_builder = StringBuilder::new();
    let mut name_builder = StringBuilder::new();

    let mut date_values = Vec::new();
    let mut open_values = Vec::new();
    let mut high_values = Vec::new();
    let mut low_values = Vec::new();
    let mut close_values = Vec::new();
    let mut volume_values = Vec::new();
    let mut amount_values = Vec::new();
    let mut offsets = vec![0i32];

    for stock in data {
        exchange_builder.append_value(&stock.exchange);
        symbol_builder.append_value(&stock.symbol);
        name_builder.append_value(&stock.name);

        for daily in &stock.daily {
            date_values.push(daily.date);
            open_values.push(daily.open);
            high_values.push(daily.high);
            low_values.push(daily.low);
            close_values.push(daily.close);
            volume_values.push(daily.volume);
            amount_values.push(daily.amount);
        }

        let last = offsets.last().copied().unwrap_or_default();
        offsets.push(last + stock.daily.len() as i32);
    }

    let fields = daily_fields();
    let struct_array = StructArray::try_new(
        fields.clone(),
        vec![
            Arc::new(Int32Array::from(date_values)) as ArrayRef,
            Arc::new(Float32Array::from(open_values)),
            Arc::new(Float32Array::from(high_values)),
            Arc::new(Float32Array::from(low_values)),
            Arc::new(Float32Array::from(close_values)),
            Arc::new(Int64Array::from(volume_values)),
            Arc::new(Int64Array::from(amount_values)),
        ],
        None,
    ).map_err(|e| ScreenerError::ArrowError(e.to_string()))?;

    let item_field = Arc::new(Field::new("item", DataType::Struct(fields), false));
    let list_array = ListArray::try_new(
        item_field.clone(),
        arrow::buffer::OffsetBuffer::new(arrow::buffer::ScalarBuffer::from(offsets)),
        Arc::new(struct_array),
        Some(NullBuffer::from(vec![true; data.len()])),
    ).map_err(|e| ScreenerError::ArrowError(e.to_string()))?;

    let schema = Schema::new(vec![
        Field::new("exchange", DataType::Utf8, false),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("daily", DataType::List(item_field), true),
    ]);

    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(exchange_builder.finish()) as ArrayRef,
            Arc::new(symbol_builder.finish()),
            Arc::new(name_builder.finish()),
            Arc::new(list_array),
        ],
    )
    .map_err(|e| ScreenerError::ArrowError(e.to_string()))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch.column_by_name(name)
        .and_then(|a| a.as_any().downcast_ref::<T>())
        .ok_or_else(|| ScreenerError::ArrowError(format!("Failed to downcast {} column", name)))
}

fn struct_column<'a, T: 'static>(array: &'a StructArray, name: &str) -> Result<&'a T> {
    array.column_by_name(name)
        .and_then(|a| a.as_any().downcast_ref::<T>())
        .ok_or_else(|| ScreenerError::ArrowError(format!("Missing daily column {}", name)))
}

fn read_stock_data<R: std::io::Read + std::io::Seek>(source: R) -> Result<Vec<StockData>> {
    let reader = FileReader::try_new(source, None)
        .map_err(|e| ScreenerError::ArrowError(e.to_string()))?;

    let mut result = Vec::new();

    for batch in reader {
        let batch = batch.map_err(|e| ScreenerError::ArrowError(e.to_string()))?;

        let exchange_array = column::<StringArray>(&batch, "exchange")?;
        let symbol_array = column::<StringArray>(&batch, "symbol")?;
        let name_array = column::<StringArray>(&batch, "name")?;
        let daily_array = column::<ListArray>(&batch, "daily")?;

        for i in 0..batch.num_rows() {
            let mut daily = Vec::new();

            if !daily_array.is_null(i) {
                let list = daily_array.value(i);
                let daily_struct = list.as_any().downcast_ref::<StructArray>()
                    .ok_or_else(|| ScreenerError::ArrowError("Failed to downcast daily struct".to_string()))?;

                let date = struct_column::<Int32Array>(daily_struct, "date")?;
                let open = struct_column::<Float32Array>(daily_struct, "open")?;
                let high = struct_column::<Float32Array>(daily_struct, "high")?;
                let low = struct_column::<Float32Array>(daily_struct, "low")?;
                let close = struct_column::<Float32Array>(daily_struct, "close")?;
                let volume = struct_column::<Int64Array>(daily_struct, "volume")?;
                let amount = struct_column::<Int64Array>(daily_struct, "amount")?;

                for j in 0..daily_struct.len() {
                    daily.push(DailyData {
                        date: date.value(j),
                        open: open.value(j),
                        high: high.value(j),
                        low: low.value(j),
                        close: close.value(j),
                        volume: volume.value(j),
                        amount: amount.value(j),
                    });
                }
            }

            result.push(StockData {
                exchange: exchange_array.value(i).to_string(),
                symbol: symbol_array.value(i).to_string(),
                name: name_array.value(i).to_string(),
                daily,
            });
        }
    }

    Ok(result)
}
