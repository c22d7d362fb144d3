use rewind_core::common::Interval;
use std::time::Duration;

/// # Summary
/// 回放定时调度器：根据周期、倍速与采样点数推算下一次唤醒时刻。
///
/// # Invariants
/// - 间隔始终落在 `[min_tick, max_tick]` 内。
/// - 未启动 (`next_due == None`) 时不会产生任何到期采样。
#[derive(Debug, Clone)]
pub struct TickScheduler {
    min_tick: Duration,
    max_tick: Duration,
    interval: Duration,
    // 下一次到期的时钟毫秒
    next_due: Option<i64>,
}

impl TickScheduler {
    pub fn new(min_tick_ms: u64, max_tick_ms: u64) -> Self {
        let min_tick = Duration::from_millis(min_tick_ms.max(1));
        let max_tick = Duration::from_millis(max_tick_ms).max(min_tick);
        Self {
            min_tick,
            max_tick,
            interval: max_tick,
            next_due: None,
        }
    }

    /// # Summary
    /// 计算墙钟采样间隔 `timeframe / speed / num_ticks` 并夹紧到上下限。
    ///
    /// # Logic
    /// 非法倍速 (非有限或非正) 或溢出时取上限。
    pub fn compute_interval(&self, timeframe: Interval, speed: f64, num_ticks: usize) -> Duration {
        let ticks = num_ticks.max(1) as f64;
        let secs = timeframe.duration_ms() as f64 / 1000.0 / speed / ticks;
        Duration::try_from_secs_f64(secs)
            .map_or(self.max_tick, |d| d.clamp(self.min_tick, self.max_tick))
    }

    /// 更新间隔；已启动时从 `now_ms` 起重新计时，位置不变
    pub fn configure(&mut self, timeframe: Interval, speed: f64, num_ticks: usize, now_ms: i64) {
        self.interval = self.compute_interval(timeframe, speed, num_ticks);
        if self.next_due.is_some() {
            self.arm(now_ms);
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn interval_ms(&self) -> i64 {
        i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX)
    }

    /// 从 `now_ms` 起启动，首个采样在一个间隔后到期
    pub fn arm(&mut self, now_ms: i64) {
        self.next_due = Some(now_ms.saturating_add(self.interval_ms()));
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// 下一次唤醒的时钟毫秒
    pub fn next_wake(&self) -> Option<i64> {
        self.next_due
    }

    /// # Summary
    /// 取出截至 `now_ms` 已到期的采样数，并把下一次到期时间推到之后的槽位。
    ///
    /// # Returns
    /// 未启动或尚未到期时返回 0。
    pub fn take_due(&mut self, now_ms: i64) -> usize {
        let Some(due) = self.next_due else {
            return 0;
        };
        if now_ms < due {
            return 0;
        }
        let step = self.interval_ms().max(1);
        let elapsed = (now_ms - due) / step + 1;
        self.next_due = Some(due.saturating_add(elapsed.saturating_mul(step)));
        usize::try_from(elapsed).unwrap_or(usize::MAX)
    }
}
