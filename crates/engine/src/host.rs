use crate::replay::TickReplayEngine;
use rewind_core::common::Interval;
use rewind_core::market::entity::Candle;
use rewind_core::replay::entity::ReplayCommand;
use rewind_core::replay::error::ReplayError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// # Summary
/// 回放宿主的控制句柄，通过消息通道向宿主任务发送命令，从不阻塞。
#[derive(Debug, Clone)]
pub struct ReplayHandle {
    tx: mpsc::UnboundedSender<ReplayCommand>,
}

impl ReplayHandle {
    pub fn send(&self, command: ReplayCommand) -> Result<(), ReplayError> {
        self.tx.send(command).map_err(|_| ReplayError::HostClosed)
    }

    pub fn play(&self) -> Result<(), ReplayError> {
        self.send(ReplayCommand::Play)
    }

    pub fn pause(&self) -> Result<(), ReplayError> {
        self.send(ReplayCommand::Pause)
    }

    pub fn stop(&self) -> Result<(), ReplayError> {
        self.send(ReplayCommand::Stop)
    }

    pub fn seek_to(&self, index: usize) -> Result<(), ReplayError> {
        self.send(ReplayCommand::SeekTo(index))
    }

    pub fn jump_to_timestamp(&self, timestamp: i64) -> Result<(), ReplayError> {
        self.send(ReplayCommand::JumpToTimestamp(timestamp))
    }

    pub fn set_speed(&self, speed: f64) -> Result<(), ReplayError> {
        self.send(ReplayCommand::SetSpeed(speed))
    }

    pub fn set_timeframe(&self, timeframe: Interval) -> Result<(), ReplayError> {
        self.send(ReplayCommand::SetTimeframe(timeframe))
    }

    pub fn reload(&self, candles: Vec<Candle>, timeframe: Interval) -> Result<(), ReplayError> {
        self.send(ReplayCommand::Reload { candles, timeframe })
    }

    pub fn shutdown(&self) -> Result<(), ReplayError> {
        self.send(ReplayCommand::Shutdown)
    }
}

/// # Summary
/// 在独立的 tokio 任务中运行回放引擎。
///
/// # Invariants
/// - 引擎只被宿主任务持有，外部只能通过 `ReplayHandle` 与事件通道交互。
/// - 所有句柄被丢弃、收到 `Shutdown` 或事件接收端被丢弃时任务退出。
pub struct ReplayHost;

impl ReplayHost {
    /// # Summary
    /// 启动宿主任务。
    ///
    /// # Logic
    /// 循环中同时等待控制命令与调度器的下一次唤醒 (`tokio::select!`)：
    /// 命令立即应用到引擎；唤醒时推进所有到期的采样点。
    ///
    /// # Returns
    /// 控制句柄与任务句柄。
    pub fn spawn(mut engine: TickReplayEngine) -> (ReplayHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ReplayCommand>();

        let task = tokio::spawn(async move {
            info!("Replay host started with {} candles", engine.len());
            loop {
                let wait = engine.millis_until_wake().map(Duration::from_millis);
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(ReplayCommand::Shutdown) | None => {
                            engine.dispose();
                        }
                        Some(command) => {
                            if let Err(e) = engine.apply(command) {
                                warn!("Replay command rejected: {}", e);
                            }
                        }
                    },
                    _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {
                        engine.poll();
                    }
                }
                if engine.is_disposed() {
                    break;
                }
            }
            info!("Replay host stopped");
        });

        (ReplayHandle { tx }, task)
    }
}
