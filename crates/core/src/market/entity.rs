use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根 K 线数据实体，记录特定时段内的行情波动。
///
/// # Invariants
/// - `high >= max(open, close)`，`low <= min(open, close)`。
/// - `volume >= 0`。
/// - 任意返回给调用方的序列中 `timestamp` 严格递增。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    // K 线开始时间 (UTC 毫秒)
    pub timestamp: i64,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// K 线开始时间，毫秒值超出 `chrono` 表示范围时返回 None。
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// # Summary
    /// 检查 OHLCV 不变量。
    ///
    /// # Logic
    /// 1. 价格与成交量必须为有限数。
    /// 2. 依次检查 high、low 与开收盘价的关系，以及成交量非负。
    ///
    /// # Returns
    /// 满足不变量返回 None，否则返回第一条违例的描述。
    pub fn ohlc_violation(&self) -> Option<String> {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Some("non-finite price or volume".to_string());
        }
        if self.high < self.open.max(self.close) {
            return Some(format!(
                "high {} below max(open {}, close {})",
                self.high, self.open, self.close
            ));
        }
        if self.low > self.open.min(self.close) {
            return Some(format!(
                "low {} above min(open {}, close {})",
                self.low, self.open, self.close
            ));
        }
        if self.volume < 0.0 {
            return Some(format!("negative volume {}", self.volume));
        }
        None
    }
}

/// # Summary
/// 聚合后的 K 线，携带桶完整度信息。
///
/// # Invariants
/// - `bucket_start` 对齐到目标周期网格，`candle.timestamp` 位于 `[bucket_start, bucket_start + 目标时长)`。
/// - `is_partial == (candle_count < expected_count)`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResampledCandle {
    // 聚合结果，时间戳取桶内第一根源 K 线的时间
    pub candle: Candle,
    // 所属网格桶的起点 (UTC 毫秒)
    pub bucket_start: i64,
    // 桶内源 K 线数量少于完整桶
    pub is_partial: bool,
    // 桶内实际源 K 线数量
    pub candle_count: usize,
    // 完整桶应有的源 K 线数量
    pub expected_count: usize,
}

/// # Summary
/// 单次批量下载的日期窗口，区间为左闭右开 `[start, end)`。
///
/// # Invariants
/// - `id` 固定为 `{start}_to_{end}` (YYYY-MM-DD)。
/// - 仅在一次外部抓取期间存在，合并后即丢弃。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    // 该窗口实际抓取到的 K 线数量，规划阶段为 0
    pub candle_count: usize,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            id: format!(
                "{}_to_{}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
            start,
            end,
            candle_count: 0,
        }
    }

    /// 窗口覆盖的自然日数量。
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// 窗口起点 (UTC 零点) 的毫秒值。
    pub fn start_ms(&self) -> i64 {
        midnight_ms(self.start)
    }

    /// 窗口终点 (UTC 零点，不含) 的毫秒值。
    pub fn end_ms(&self) -> i64 {
        midnight_ms(self.end)
    }
}

fn midnight_ms(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}

/// # Summary
/// 相邻 K 线之间超出预期间隔的缺口。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    // 缺口前一根 K 线时间
    pub from_ms: i64,
    // 缺口后一根 K 线时间
    pub to_ms: i64,
    // 实际间隔
    pub delta_ms: i64,
    // 按预期间隔估算缺失的 K 线数量
    pub missing_candles: i64,
}

/// # Summary
/// 数据完整性问题，只报告、不中断流程。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataIssue {
    // 时间戳重复
    Duplicate { timestamp: i64 },
    // 时间戳未按升序排列
    Unsorted { index: usize, previous: i64, timestamp: i64 },
    // 相邻 K 线间存在缺口 (常见于休市)
    Gap(Gap),
    // 聚合结果未对齐到目标周期网格
    Misaligned { timestamp: i64, bucket_start: i64 },
    // OHLCV 不变量被破坏
    OhlcViolation { timestamp: i64, detail: String },
    // 聚合后数量多于原始数量
    LengthExceeded { original: usize, resampled: usize },
}

impl std::fmt::Display for DataIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataIssue::Duplicate { timestamp } => write!(f, "duplicate timestamp {timestamp}"),
            DataIssue::Unsorted {
                index,
                previous,
                timestamp,
            } => write!(
                f,
                "unsorted at index {index}: {timestamp} follows {previous}"
            ),
            DataIssue::Gap(gap) => write!(
                f,
                "gap of {} ms between {} and {} (~{} missing)",
                gap.delta_ms, gap.from_ms, gap.to_ms, gap.missing_candles
            ),
            DataIssue::Misaligned {
                timestamp,
                bucket_start,
            } => write!(f, "timestamp {timestamp} misaligned to bucket {bucket_start}"),
            DataIssue::OhlcViolation { timestamp, detail } => {
                write!(f, "OHLC violation at {timestamp}: {detail}")
            }
            DataIssue::LengthExceeded {
                original,
                resampled,
            } => write!(
                f,
                "resampled length {resampled} exceeds original length {original}"
            ),
        }
    }
}

/// # Summary
/// 结构化的完整性报告 `{valid, issues[]}`。
///
/// # Invariants
/// - `valid` 由生成方按各自规则判定；缺口本身通常不使报告失效。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub issues: Vec<DataIssue>,
}

impl IntegrityReport {
    /// 重复时间戳数量
    pub fn duplicate_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, DataIssue::Duplicate { .. }))
            .count()
    }

    /// 缺口数量
    pub fn gap_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, DataIssue::Gap(_)))
            .count()
    }

    /// 序列是否按升序排列
    pub fn is_sorted(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| matches!(i, DataIssue::Unsorted { .. }))
    }
}
