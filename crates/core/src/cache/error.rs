use thiserror::Error;

/// # Summary
/// 缓存域错误枚举，处理序列化与底层存储故障。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 缓存故障只影响加速路径，调用方应降级为重新加载而不是中断。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    // 数据序列化失败
    #[error("Serialize error: {0}")]
    Serialize(String),
    // 数据反序列化失败 (通常意味着缓存条目来自旧版本结构)
    #[error("Deserialize error: {0}")]
    Deserialize(String),
    // 底层存储引擎故障
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<CacheError> for crate::market::error::MarketError {
    fn from(e: CacheError) -> Self {
        crate::market::error::MarketError::Cache(e.to_string())
    }
}
