use crate::common::Interval;
use crate::market::entity::Candle;
use serde::{Deserialize, Serialize};

/// # Summary
/// 回放播放状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Stopped,
    Paused,
    Playing,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Playing => write!(f, "playing"),
        }
    }
}

/// # Summary
/// 合成的 K 线内部采样点，仅用于动画展示，不代表真实成交，也不做持久化。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayTick {
    // 采样价格
    pub price: f64,
    // 该采样点分得的成交量
    pub volume: f64,
    // 采样时刻 (UTC 毫秒，位于所属 K 线的时间跨度内)
    pub timestamp: i64,
    // 所属 K 线在队列中的下标
    pub candle_index: usize,
    // 在所属 K 线内的采样下标
    pub tick_index: usize,
}

/// # Summary
/// 回放进度快照。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayProgress {
    pub candle_index: usize,
    pub tick_index: usize,
    pub total_candles: usize,
    // 0.0 ~ 1.0
    pub fraction: f64,
}

/// # Summary
/// 引擎对外发出的事件，每个引擎实例只有一条类型化的事件通道。
///
/// # Invariants
/// - 同一根 K 线内 `TickAdvanced` 的 `tick_index` 在播放期间严格递增。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplayEvent {
    // 进入新的 K 线 (含跳转)
    CandleChanged { index: usize, candle: Candle },
    // 采样点推进；`partial` 为渲染端应展示的未完成 K 线
    TickAdvanced { tick: ReplayTick, partial: Candle },
    // 进度更新
    Progress(ReplayProgress),
    // 播放到最后一根 K 线的最后一个采样点
    PlaybackComplete,
}

/// # Summary
/// 发往回放宿主任务的控制命令。
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayCommand {
    Play,
    Pause,
    Stop,
    SeekTo(usize),
    JumpToTimestamp(i64),
    SetSpeed(f64),
    SetTimeframe(Interval),
    // 切换数据：先暂停取消定时器，再替换队列
    Reload {
        candles: Vec<Candle>,
        timeframe: Interval,
    },
    Shutdown,
}
