use thiserror::Error;

/// # Summary
/// 回放引擎域错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    // 跳转目标超出队列范围
    #[error("Candle index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    // 播放速度必须为有限正数
    #[error("Invalid speed multiplier: {0}")]
    InvalidSpeed(f64),
    // 引擎已销毁
    #[error("Replay engine disposed")]
    Disposed,
    // 宿主任务已退出，命令无法送达
    #[error("Replay host closed")]
    HostClosed,
}
