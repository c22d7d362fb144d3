use chrono::{Days, NaiveDate};
use rewind_core::common::Interval;
use rewind_core::config::ProviderLimits;
use rewind_core::market::entity::Window;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// # Summary
/// 将 `[start, end)` 切分为连续、互不重叠的下载窗口。
///
/// # Logic
/// 1. `start > end` 返回空列表。
/// 2. `start == end` 返回一个零长度窗口。
/// 3. 否则按 `size_days` 步进，最后一个窗口截断到 `end`。`size_days == 0` 按 1 处理。
///
/// # Arguments
/// * `start`: 起始日期 (含)。
/// * `end`: 结束日期 (不含)。
/// * `size_days`: 单个窗口的自然日数。
///
/// # Returns
/// 按时间顺序排列的窗口列表。
pub fn generate_windows(start: NaiveDate, end: NaiveDate, size_days: u32) -> Vec<Window> {
    if start > end {
        return Vec::new();
    }
    if start == end {
        return vec![Window::new(start, end)];
    }

    let step = Days::new(u64::from(size_days.max(1)));
    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = cursor.checked_add_days(step).map_or(end, |d| d.min(end));
        windows.push(Window::new(cursor, next));
        cursor = next;
    }
    windows
}

/// 单个窗口的校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowValidation {
    pub valid: bool,
    pub reason: Option<String>,
}

/// # Summary
/// 按数据提供方限制规划下载窗口。
///
/// # Invariants
/// - 提供方限制只来自 `ProviderLimits` 配置。
#[derive(Debug, Clone, Default)]
pub struct WindowPlanner {
    limits: ProviderLimits,
}

impl WindowPlanner {
    pub fn new(limits: ProviderLimits) -> Self {
        Self { limits }
    }

    /// 指定周期的推荐 (最大安全) 窗口天数
    pub fn recommended_window_days(&self, interval: Interval) -> u32 {
        self.limits.max_window_days(interval)
    }

    /// # Summary
    /// 检查窗口是否满足该周期的提供方限制。
    pub fn validate_window(&self, window: &Window, interval: Interval) -> WindowValidation {
        let days = window.days();
        let max = self.recommended_window_days(interval);
        if days < 0 {
            return WindowValidation {
                valid: false,
                reason: Some(format!("Window {} ends before it starts", window.id)),
            };
        }
        if days > i64::from(max) {
            return WindowValidation {
                valid: false,
                reason: Some(format!(
                    "Window {} spans {} days, {} allows at most {}",
                    window.id, days, interval, max
                )),
            };
        }
        WindowValidation {
            valid: true,
            reason: None,
        }
    }

    /// 以推荐窗口大小规划 `[start, end)`
    pub fn plan(&self, start: NaiveDate, end: NaiveDate, interval: Interval) -> Vec<Window> {
        let windows = generate_windows(start, end, self.recommended_window_days(interval));
        debug!(
            "Planned {} {} windows for {} to {}",
            windows.len(),
            interval,
            start,
            end
        );
        windows
    }

    /// 把超限窗口重新切分为合规的子窗口
    pub fn shrink(&self, window: &Window, interval: Interval) -> Vec<Window> {
        generate_windows(
            window.start,
            window.end,
            self.recommended_window_days(interval),
        )
    }
}
