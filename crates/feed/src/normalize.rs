//! 数据接入边界：把各种形态的原始 K 线 JSON 统一归一化为 `Candle`。

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rewind_core::market::entity::Candle;
use rewind_core::market::error::MarketError;
use rewind_market::merge::deduplicate_candles;
use serde_json::{Map, Value};
use tracing::{debug, warn};

// 包裹对象中可能存放 K 线数组的字段，按优先级排列
const ARRAY_KEYS: [&str; 3] = ["candles", "data", "klines"];
const TIME_KEYS: [&str; 4] = ["time", "t", "timestamp", "Time"];
const OPEN_KEYS: [&str; 3] = ["open", "o", "Open"];
const HIGH_KEYS: [&str; 3] = ["high", "h", "High"];
const LOW_KEYS: [&str; 3] = ["low", "l", "Low"];
const CLOSE_KEYS: [&str; 3] = ["close", "c", "Close"];
const VOLUME_KEYS: [&str; 4] = ["volume", "vol", "Volume", "v"];

// 小于该值的数字时间戳按秒解释
const SECONDS_THRESHOLD: i64 = 10_000_000_000;

/// # Summary
/// 解析整个数据文件。
///
/// # Logic
/// 1. 顶层可以是裸数组，也可以是包含 `candles` / `data` / `klines` 数组的对象。
/// 2. 逐行归一化，格式错误的行记录告警后跳过。
/// 3. 结果按时间排序并去重 (保留首次出现)。
///
/// # Arguments
/// * `bytes`: 文件内容。
/// * `file_date`: 文件名中的日期，用于补全只有时分秒的时间值。
///
/// # Returns
/// 严格升序的 K 线序列；顶层结构无法识别时返回 `Parse` 错误。
pub fn normalize_payload(bytes: &[u8], file_date: Option<NaiveDate>) -> Result<Vec<Candle>, MarketError> {
    let payload: Value =
        serde_json::from_slice(bytes).map_err(|e| MarketError::Parse(e.to_string()))?;
    let rows = extract_rows(&payload)
        .ok_or_else(|| MarketError::Parse("No candle array in payload".to_string()))?;

    let mut candles = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for (index, row) in rows.iter().enumerate() {
        match normalize_row(row, file_date) {
            Ok(candle) => {
                if let Some(detail) = candle.ohlc_violation() {
                    warn!("Row {} at {} violates OHLC invariants: {}", index, candle.timestamp, detail);
                }
                candles.push(candle);
            }
            Err(e) => {
                skipped += 1;
                debug!("Skipping malformed row {}: {}", index, e);
            }
        }
    }
    if skipped > 0 {
        warn!("Skipped {} malformed rows out of {}", skipped, rows.len());
    }
    Ok(deduplicate_candles(&candles))
}

fn extract_rows(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(rows) => Some(rows),
        Value::Object(map) => {
            let arrays: Vec<&Vec<Value>> = ARRAY_KEYS
                .iter()
                .filter_map(|k| map.get(*k).and_then(Value::as_array))
                .collect();
            // 优先取第一个非空数组
            arrays
                .iter()
                .find(|a| !a.is_empty())
                .or(arrays.first())
                .copied()
        }
        _ => None,
    }
}

/// # Summary
/// 归一化单行数据，支持短字段 (`t/o/h/l/c/v`) 与长字段名。
///
/// # Logic
/// 四个价格字段缺一不可；成交量缺失按 0 处理。
pub fn normalize_row(row: &Value, file_date: Option<NaiveDate>) -> Result<Candle, MarketError> {
    let map = row
        .as_object()
        .ok_or_else(|| MarketError::Parse(format!("Row is not an object: {row}")))?;

    let time = field(map, &TIME_KEYS)
        .ok_or_else(|| MarketError::MalformedTimestamp("missing time field".to_string()))?;
    let timestamp = parse_time(time, file_date)?;

    let price = |keys: &[&str], name: &str| -> Result<f64, MarketError> {
        field(map, keys)
            .and_then(number)
            .ok_or_else(|| MarketError::Parse(format!("missing or invalid {name}")))
    };

    Ok(Candle {
        timestamp,
        open: price(&OPEN_KEYS, "open")?,
        high: price(&HIGH_KEYS, "high")?,
        low: price(&LOW_KEYS, "low")?,
        close: price(&CLOSE_KEYS, "close")?,
        volume: field(map, &VOLUME_KEYS).and_then(number).unwrap_or(0.0),
    })
}

// 按优先级取第一个非 null 的字段
fn field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn number(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

// 2^63，i64 取值范围为 [-2^63, 2^63)
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

// 小数部分截断；超出 i64 范围或非有限值返回 None
fn float_to_i64(value: f64) -> Option<i64> {
    if !value.is_finite() || value < -I64_BOUND || value >= I64_BOUND {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let whole = value.trunc() as i64;
    Some(whole)
}

/// # Summary
/// 解析时间值为 UTC 毫秒。
///
/// # Logic
/// - 数字：小于 1e10 视为秒，否则为毫秒。
/// - 字符串：依次尝试数字、RFC 3339、`YYYY-MM-DD HH:MM:SS` (UTC)，
///   最后尝试 `HH:MM[:SS]` 并与文件日期拼接 (UTC)。
pub fn parse_time(value: &Value, file_date: Option<NaiveDate>) -> Result<i64, MarketError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(float_to_i64))
            .map(epoch_to_ms)
            .ok_or_else(|| MarketError::MalformedTimestamp(n.to_string())),
        Value::String(s) => parse_time_str(s.trim(), file_date),
        other => Err(MarketError::MalformedTimestamp(other.to_string())),
    }
}

fn epoch_to_ms(raw: i64) -> i64 {
    if raw.abs() < SECONDS_THRESHOLD {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

fn parse_time_str(raw: &str, file_date: Option<NaiveDate>) -> Result<i64, MarketError> {
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(epoch_to_ms(n));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    if let Some(date) = file_date {
        for format in ["%H:%M:%S", "%H:%M"] {
            if let Ok(time) = NaiveTime::parse_from_str(raw, format) {
                return Ok(date.and_time(time).and_utc().timestamp_millis());
            }
        }
    }
    Err(MarketError::MalformedTimestamp(raw.to_string()))
}
