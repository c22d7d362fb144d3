use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// # Summary
/// 时钟接口，用于隔离物理系统时钟。
/// 回放调度器只通过此接口读取“现在”，测试因此可以确定性地拨动时间。
pub trait Clock: Send + Sync {
    /// 当前时刻，UTC 毫秒。
    fn now_ms(&self) -> i64;

    /// 当前时刻的 `DateTime` 形式，超出表示范围时返回 None。
    fn now(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.now_ms())
    }
}

/// # Summary
/// 真实时钟，直接返回操作系统当前时间。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// # Summary
/// 虚拟时钟，允许测试与离线回放主动拨快时间。
///
/// # Invariants
/// - 并发安全：内部使用原子整数，读写均无锁。
#[derive(Debug, Default)]
pub struct VirtualClock {
    current_ms: AtomicI64,
}

impl VirtualClock {
    /// 使用指定的初始毫秒时间创建虚拟时钟
    pub fn new(initial_ms: i64) -> Self {
        Self {
            current_ms: AtomicI64::new(initial_ms),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_ms(&self, now_ms: i64) {
        self.current_ms.store(now_ms, Ordering::SeqCst);
    }

    /// 将时钟向前拨动 `delta_ms` 毫秒，返回拨动后的时间
    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.current_ms.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> i64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}
