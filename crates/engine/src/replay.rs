use crate::path::TickPath;
use crate::scheduler::TickScheduler;
use rewind_core::common::Interval;
use rewind_core::common::time::Clock;
use rewind_core::config::ReplaySettings;
use rewind_core::market::entity::Candle;
use rewind_core::replay::entity::{
    PlaybackState, ReplayCommand, ReplayEvent, ReplayProgress, ReplayTick,
};
use rewind_core::replay::error::ReplayError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// # Summary
/// 逐笔回放引擎：把 K 线队列细分为采样点，按调度器节奏推进并发出事件。
///
/// # Invariants
/// - 单线程协作式：所有状态变更都发生在 `&mut self` 方法中，由调用方驱动 `poll`。
/// - 初始状态为 Paused，位置 (0, 0)。
/// - `pause`/`stop` 返回后不会再有采样事件发出。
/// - 进入 K 线时生成一次采样路径并缓存，直到离开该 K 线。
/// - 事件接收端被丢弃后，下一次发送时引擎自行销毁。
pub struct TickReplayEngine {
    // 待回放队列 (构造时复制，调用方数据不被修改)
    candles: Vec<Candle>,
    timeframe: Interval,
    num_ticks: usize,
    speed: f64,
    clock: Arc<dyn Clock>,
    scheduler: TickScheduler,
    state: PlaybackState,
    candle_index: usize,
    tick_index: usize,
    // 当前 K 线的采样路径
    path: Option<TickPath>,
    // 已播放到末尾，下一次 play 从头开始
    completed: bool,
    events: Option<mpsc::UnboundedSender<ReplayEvent>>,
}

impl TickReplayEngine {
    /// # Summary
    /// 创建引擎及其事件接收端。
    ///
    /// # Arguments
    /// * `candles`: 回放队列。
    /// * `timeframe`: 队列 K 线的周期，决定采样时间戳与节奏。
    /// * `settings`: 采样点数、默认倍速与间隔上下限。
    /// * `clock`: 时钟实现。
    ///
    /// # Returns
    /// 引擎实例与唯一的事件接收端。
    pub fn new(
        candles: &[Candle],
        timeframe: Interval,
        settings: &ReplaySettings,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<ReplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let num_ticks = settings.num_ticks.max(2);
        let speed = if settings.speed.is_finite() && settings.speed > 0.0 {
            settings.speed
        } else {
            1.0
        };
        let mut scheduler = TickScheduler::new(settings.min_tick_ms, settings.max_tick_ms);
        scheduler.configure(timeframe, speed, num_ticks, clock.now_ms());

        let mut engine = Self {
            candles: candles.to_vec(),
            timeframe,
            num_ticks,
            speed,
            clock,
            scheduler,
            state: PlaybackState::Paused,
            candle_index: 0,
            tick_index: 0,
            path: None,
            completed: false,
            events: Some(tx),
        };
        engine.load_path();
        (engine, rx)
    }

    // ---- 播放控制 ----

    /// # Summary
    /// 开始或继续播放。
    ///
    /// # Logic
    /// 1. 空队列为空操作。
    /// 2. 上一轮已播放完毕时从第 0 根重新开始。
    /// 3. 进入 Playing 并启动调度器。
    pub fn play(&mut self) -> Result<(), ReplayError> {
        self.ensure_alive()?;
        if self.candles.is_empty() {
            debug!("Ignoring play on empty replay queue");
            return Ok(());
        }
        if self.state == PlaybackState::Playing {
            return Ok(());
        }
        if self.completed {
            self.enter_candle(0);
        }
        self.state = PlaybackState::Playing;
        self.scheduler.arm(self.clock.now_ms());
        info!(
            "Replay playing from candle {}/{} at {}x",
            self.candle_index,
            self.candles.len(),
            self.speed
        );
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ReplayError> {
        self.ensure_alive()?;
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            self.scheduler.cancel();
            debug!("Replay paused at ({}, {})", self.candle_index, self.tick_index);
        }
        Ok(())
    }

    /// 停止并回到 (0, 0)
    pub fn stop(&mut self) -> Result<(), ReplayError> {
        self.ensure_alive()?;
        self.scheduler.cancel();
        self.state = PlaybackState::Stopped;
        if !self.candles.is_empty() {
            self.enter_candle(0);
        }
        Ok(())
    }

    /// # Summary
    /// 推进所有已到期的采样点。
    ///
    /// # Logic
    /// 非 Playing 状态直接返回；每推进一步后重新检查状态，
    /// 完成或销毁会立即终止本次推进。只统计实际移动的采样点。
    ///
    /// # Returns
    /// 本次推进的采样点数。
    pub fn poll(&mut self) -> usize {
        if self.state != PlaybackState::Playing {
            return 0;
        }
        let due = self.scheduler.take_due(self.clock.now_ms());
        let mut advanced = 0;
        for _ in 0..due {
            if self.state != PlaybackState::Playing {
                break;
            }
            if self.advance() {
                advanced += 1;
            }
        }
        advanced
    }

    // ---- 定位 ----

    /// 跳到指定 K 线的第 0 个采样点
    pub fn seek_to(&mut self, index: usize) -> Result<(), ReplayError> {
        self.ensure_alive()?;
        if index >= self.candles.len() {
            return Err(ReplayError::IndexOutOfRange {
                index,
                len: self.candles.len(),
            });
        }
        self.enter_candle(index);
        if self.state == PlaybackState::Playing {
            self.scheduler.arm(self.clock.now_ms());
        }
        Ok(())
    }

    /// # Summary
    /// 二分查找时间戳所属的 K 线，即 `start <= ts` 的最后一根。
    ///
    /// # Returns
    /// 空队列返回 None；早于首根时返回 0。
    pub fn locate(&self, timestamp: i64) -> Option<usize> {
        if self.candles.is_empty() {
            return None;
        }
        let after = self.candles.partition_point(|c| c.timestamp <= timestamp);
        Some(after.saturating_sub(1))
    }

    /// # Summary
    /// 跳到指定时间戳。
    ///
    /// # Logic
    /// 1. 播放中先暂停。
    /// 2. 二分定位 K 线，按 K 线内进度计算采样下标。
    /// 3. 之前在播放则恢复播放。
    ///
    /// # Returns
    /// 定位到的 K 线下标。
    pub fn jump_to_timestamp(&mut self, timestamp: i64) -> Result<usize, ReplayError> {
        self.ensure_alive()?;
        let Some(index) = self.locate(timestamp) else {
            return Err(ReplayError::IndexOutOfRange { index: 0, len: 0 });
        };
        let was_playing = self.state == PlaybackState::Playing;
        self.pause()?;

        self.enter_candle(index);
        let tick = self.tick_for(index, timestamp);
        if tick > 0 {
            self.tick_index = tick;
            self.emit_tick();
        }

        if was_playing {
            self.play()?;
        }
        Ok(index)
    }

    // ---- 参数调整 ----

    /// 修改倍速；播放中从当前时刻重新计时，位置不变
    pub fn set_speed(&mut self, speed: f64) -> Result<(), ReplayError> {
        self.ensure_alive()?;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ReplayError::InvalidSpeed(speed));
        }
        self.speed = speed;
        self.reconfigure();
        Ok(())
    }

    /// 修改回放周期；播放中从当前时刻重新计时，位置不变
    pub fn set_timeframe(&mut self, timeframe: Interval) -> Result<(), ReplayError> {
        self.ensure_alive()?;
        self.timeframe = timeframe;
        self.reconfigure();
        Ok(())
    }

    /// # Summary
    /// 替换回放队列。
    ///
    /// # Logic
    /// 先暂停并取消定时器，再替换数据并回到 (0, 0)，结束后保持暂停。
    pub fn reload(&mut self, candles: &[Candle], timeframe: Interval) -> Result<(), ReplayError> {
        self.ensure_alive()?;
        self.pause()?;
        self.scheduler.cancel();

        self.candles = candles.to_vec();
        self.timeframe = timeframe;
        self.scheduler
            .configure(timeframe, self.speed, self.num_ticks, self.clock.now_ms());
        self.state = PlaybackState::Paused;
        self.candle_index = 0;
        self.tick_index = 0;
        self.completed = false;
        self.path = None;
        if !self.candles.is_empty() {
            self.enter_candle(0);
        }
        info!("Replay reloaded with {} {} candles", self.candles.len(), timeframe);
        Ok(())
    }

    /// 执行一条控制命令
    pub fn apply(&mut self, command: ReplayCommand) -> Result<(), ReplayError> {
        match command {
            ReplayCommand::Play => self.play(),
            ReplayCommand::Pause => self.pause(),
            ReplayCommand::Stop => self.stop(),
            ReplayCommand::SeekTo(index) => self.seek_to(index),
            ReplayCommand::JumpToTimestamp(ts) => self.jump_to_timestamp(ts).map(|_| ()),
            ReplayCommand::SetSpeed(speed) => self.set_speed(speed),
            ReplayCommand::SetTimeframe(timeframe) => self.set_timeframe(timeframe),
            ReplayCommand::Reload { candles, timeframe } => self.reload(&candles, timeframe),
            ReplayCommand::Shutdown => {
                self.dispose();
                Ok(())
            }
        }
    }

    /// 销毁引擎：取消定时器并关闭事件通道，可重复调用
    pub fn dispose(&mut self) {
        if self.events.take().is_some() {
            info!("Replay engine disposed at candle {}", self.candle_index);
        }
        self.scheduler.cancel();
        self.state = PlaybackState::Stopped;
    }

    // ---- 查询 ----

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.events.is_none()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candle_index(&self) -> usize {
        self.candle_index
    }

    pub fn tick_index(&self) -> usize {
        self.tick_index
    }

    pub fn num_ticks(&self) -> usize {
        self.num_ticks
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn timeframe(&self) -> Interval {
        self.timeframe
    }

    /// 当前采样间隔
    pub fn tick_interval(&self) -> std::time::Duration {
        self.scheduler.interval()
    }

    /// 调度器下一次唤醒的时钟毫秒，未播放时为 None
    pub fn next_wake(&self) -> Option<i64> {
        self.scheduler.next_wake()
    }

    /// 距离下一次唤醒的毫秒数
    pub fn millis_until_wake(&self) -> Option<u64> {
        self.next_wake().map(|at| {
            let remaining = at.saturating_sub(self.clock.now_ms()).max(0);
            u64::try_from(remaining).unwrap_or(0)
        })
    }

    pub fn current_candle(&self) -> Option<&Candle> {
        self.candles.get(self.candle_index)
    }

    pub fn current_tick(&self) -> Option<ReplayTick> {
        let candle = self.current_candle()?;
        let path = self.path.as_ref()?;
        Some(ReplayTick {
            price: *path.prices.get(self.tick_index)?,
            volume: *path.volumes.get(self.tick_index)?,
            timestamp: self.tick_timestamp(candle, self.tick_index),
            candle_index: self.candle_index,
            tick_index: self.tick_index,
        })
    }

    /// # Summary
    /// 当前未完成的 K 线：开盘价固定，高低为已走过路径的极值，收盘为当前价，量为累计量。
    pub fn partial_candle(&self) -> Option<Candle> {
        let candle = self.current_candle()?;
        let path = self.path.as_ref()?;
        let end = (self.tick_index + 1).min(path.len());
        let prices = &path.prices[..end];
        let close = *prices.last()?;
        Some(Candle {
            timestamp: candle.timestamp,
            open: candle.open,
            high: prices.iter().copied().fold(candle.open, f64::max),
            low: prices.iter().copied().fold(candle.open, f64::min),
            close,
            volume: path.volumes[..end].iter().sum(),
        })
    }

    pub fn progress(&self) -> ReplayProgress {
        let total = self.candles.len() * self.num_ticks;
        let position = self.candle_index * self.num_ticks + self.tick_index;
        let fraction = if total > 1 {
            position as f64 / (total - 1) as f64
        } else {
            0.0
        };
        ReplayProgress {
            candle_index: self.candle_index,
            tick_index: self.tick_index,
            total_candles: self.candles.len(),
            fraction,
        }
    }

    // ---- 内部 ----

    fn ensure_alive(&self) -> Result<(), ReplayError> {
        if self.is_disposed() {
            Err(ReplayError::Disposed)
        } else {
            Ok(())
        }
    }

    fn reconfigure(&mut self) {
        self.scheduler.configure(
            self.timeframe,
            self.speed,
            self.num_ticks,
            self.clock.now_ms(),
        );
        debug!(
            "Replay tick interval now {:?} ({} at {}x)",
            self.scheduler.interval(),
            self.timeframe,
            self.speed
        );
    }

    fn load_path(&mut self) {
        self.path = self
            .candles
            .get(self.candle_index)
            .map(|c| TickPath::generate(c, self.num_ticks));
    }

    // 进入 K 线：重置采样下标、生成路径并发出事件
    fn enter_candle(&mut self, index: usize) {
        self.candle_index = index;
        self.tick_index = 0;
        self.completed = false;
        self.load_path();
        if let Some(candle) = self.candles.get(index).copied() {
            self.emit(ReplayEvent::CandleChanged { index, candle });
            self.emit(ReplayEvent::Progress(self.progress()));
        }
    }

    /// # Logic
    /// 1. 当前 K 线还有采样点时推进一个。
    /// 2. 否则进入下一根 K 线并发出其第 0 个采样点。
    /// 3. 到达最后一根的最后一个采样点时发出完成事件并转为 Paused；
    ///    已经停在末尾 (例如跳转到末尾后播放) 时直接完成。
    ///
    /// # Returns
    /// 是否实际移动了位置。
    fn advance(&mut self) -> bool {
        if self.tick_index + 1 < self.num_ticks {
            self.tick_index += 1;
        } else if self.candle_index + 1 < self.candles.len() {
            self.enter_candle(self.candle_index + 1);
        } else {
            self.finish();
            return false;
        }
        self.emit_tick();

        if self.at_end() {
            self.finish();
        }
        true
    }

    fn at_end(&self) -> bool {
        self.candle_index + 1 == self.candles.len() && self.tick_index + 1 == self.num_ticks
    }

    // 播放中到达末尾：转为 Paused 并发出完成事件
    fn finish(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.state = PlaybackState::Paused;
        self.scheduler.cancel();
        self.completed = true;
        self.emit(ReplayEvent::Progress(self.progress()));
        self.emit(ReplayEvent::PlaybackComplete);
        info!("Replay complete after {} candles", self.candles.len());
    }

    fn emit_tick(&mut self) {
        if let (Some(tick), Some(partial)) = (self.current_tick(), self.partial_candle()) {
            self.emit(ReplayEvent::TickAdvanced { tick, partial });
        }
    }

    fn emit(&mut self, event: ReplayEvent) {
        let Some(tx) = &self.events else {
            return;
        };
        if tx.send(event).is_err() {
            debug!("Replay event receiver dropped");
            self.dispose();
        }
    }

    // 采样点时间戳：K 线起点 + 周期 × tick / num_ticks，始终落在 K 线跨度内
    fn tick_timestamp(&self, candle: &Candle, tick: usize) -> i64 {
        let tick = i64::try_from(tick).unwrap_or(0);
        let ticks = i64::try_from(self.num_ticks).unwrap_or(1).max(1);
        candle.timestamp + self.timeframe.duration_ms() * tick / ticks
    }

    // 时间戳在 K 线内对应的采样下标
    fn tick_for(&self, index: usize, timestamp: i64) -> usize {
        let Some(candle) = self.candles.get(index) else {
            return 0;
        };
        let offset = (timestamp - candle.timestamp).max(0);
        let ticks = i64::try_from(self.num_ticks).unwrap_or(1);
        let tick = offset.saturating_mul(ticks) / self.timeframe.duration_ms().max(1);
        usize::try_from(tick)
            .unwrap_or(0)
            .min(self.num_ticks - 1)
    }
}
