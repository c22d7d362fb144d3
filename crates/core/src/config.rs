use crate::common::Interval;
use crate::session::entity::SessionConfig;
use serde::{Deserialize, Serialize};

/// 全局应用配置，每个分区缺省时回落到默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub session: SessionConfig,
    pub resample: ResampleConfig,
    pub warmup: WarmupConfig,
    pub replay: ReplaySettings,
    pub provider: ProviderLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    // 按日存放的 K 线文件目录
    pub data_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

/// # Summary
/// 周期聚合参数。
///
/// # Invariants
/// - 两个阈值均为经验值，保持可配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    // 相邻源 K 线间隔超过 gap_factor × 目标时长时强制开新桶
    pub gap_factor: f64,
    // 切换周期所需的最少完整目标 K 线数，同时约束时间跨度
    pub min_buckets: usize,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            gap_factor: 2.0,
            min_buckets: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    // 预热历史的目标数量 (以展示周期计)
    pub history_size: usize,
    // 向前回溯扫描的自然日上限
    pub max_scan_days: u32,
    // 预热缓存最多保留的 (ticker, interval) 条目数
    pub cache_capacity: usize,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            history_size: 200,
            max_scan_days: 60,
            cache_capacity: 64,
        }
    }
}

/// # Summary
/// 逐笔回放参数。
///
/// # Invariants
/// - `num_ticks >= 2`，保证首个采样点为开盘价、末个采样点为收盘价。
/// - `min_tick_ms <= max_tick_ms`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    // 每根 K 线细分的采样点数
    pub num_ticks: usize,
    // 默认播放倍速
    pub speed: f64,
    // 采样间隔下限 (墙钟毫秒)
    pub min_tick_ms: u64,
    // 采样间隔上限 (墙钟毫秒)
    pub max_tick_ms: u64,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            num_ticks: 20,
            speed: 1.0,
            min_tick_ms: 16,
            max_tick_ms: 5_000,
        }
    }
}

/// # Summary
/// 数据提供方对单次请求窗口的限制 (自然日)。
///
/// # Invariants
/// - 只由窗口规划器读取，聚合器中不得写死任何提供方限制。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderLimits {
    // 1 分钟数据
    pub minute1_days: u32,
    // 2m ~ 30m 数据
    pub intraday_days: u32,
    // 60m / 1h / 4h 数据
    pub hourly_days: u32,
    // 日线数据
    pub daily_days: u32,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            minute1_days: 7,
            intraday_days: 60,
            hourly_days: 730,
            daily_days: 3_650,
        }
    }
}

impl ProviderLimits {
    /// 指定周期的最大安全窗口天数
    pub fn max_window_days(&self, interval: Interval) -> u32 {
        match interval {
            Interval::Minute1 => self.minute1_days,
            Interval::Minute2 | Interval::Minute5 | Interval::Minute15 | Interval::Minute30 => {
                self.intraday_days
            }
            Interval::Minute60 | Interval::Hour1 | Interval::Hour4 => self.hourly_days,
            Interval::Day1 => self.daily_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.data.data_dir, "data");
        assert_eq!(config.resample.gap_factor, 2.0);
        assert_eq!(config.resample.min_buckets, 10);
        assert_eq!(config.warmup.history_size, 200);
        assert_eq!(config.warmup.max_scan_days, 60);
        assert_eq!(config.replay.num_ticks, 20);
        assert_eq!(config.session.timezone, chrono_tz::Asia::Jakarta);
    }

    #[test]
    fn test_provider_limits_tightest_for_one_minute() {
        let limits = ProviderLimits::default();
        assert!(
            limits.max_window_days(Interval::Minute1) < limits.max_window_days(Interval::Minute5)
        );
        assert!(
            limits.max_window_days(Interval::Minute30) < limits.max_window_days(Interval::Hour1)
        );
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{ "warmup": { "history_size": 50 }, "session": { "timezone": "America/New_York" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.warmup.history_size, 50);
        assert_eq!(config.warmup.max_scan_days, 60);
        assert_eq!(config.session.timezone, chrono_tz::America::New_York);
        assert_eq!(config.session.open_hour, 9);
        assert_eq!(config.replay, ReplaySettings::default());
    }
}
