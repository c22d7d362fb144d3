use crate::common::Interval;
use chrono::NaiveDate;
use thiserror::Error;

/// # Summary
/// 行情数据域错误枚举，覆盖周期兼容性、数据不足、数据源缺失与解析问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - `IncompatibleInterval` 与 `InsufficientData` 必须保持区分，调用方据此给出不同提示。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    // 两个周期之间不存在整数倍关系，绝不近似处理
    #[error("Interval {from} cannot be resampled into {to}")]
    IncompatibleInterval { from: Interval, to: Interval },
    // 周期兼容，但数据量或时间跨度不足以生成足够的目标 K 线
    #[error(
        "Insufficient data for {target}: {buckets}/{required_buckets} buckets, span {span_ms}/{required_span_ms} ms"
    )]
    InsufficientData {
        target: Interval,
        buckets: usize,
        required_buckets: usize,
        span_ms: i64,
        required_span_ms: i64,
    },
    // 请求的数据文件/记录不存在
    #[error("No {interval} data for {ticker} on {date}")]
    MissingSource {
        ticker: String,
        date: NaiveDate,
        interval: Interval,
    },
    // 目录中找不到该证券、该周期的任何日文件
    #[error("No daily {interval} files for {ticker}")]
    NoDailyFiles { ticker: String, interval: Interval },
    // 无法解析的时间戳
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),
    // 数据解析错误，如 JSON 格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
    // 底层 I/O 错误
    #[error("IO error: {0}")]
    Io(String),
    // 缓存读写错误
    #[error("Cache error: {0}")]
    Cache(String),
}

impl MarketError {
    /// 是否为可在回溯扫描中跳过的缺失类错误
    pub fn is_missing(&self) -> bool {
        matches!(self, MarketError::MissingSource { .. })
    }
}
