pub mod time;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 证券标的身份，回放与缓存均以 `symbol` 作为主键。
///
/// # Invariants
/// - `symbol` 为交易所去后缀后的代码 (例如: BBCA，而非 BBCA.JK)。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Ticker {
    // 证券代码
    pub symbol: String,
    // 交易所代码 (可选，例如: IDX, NASDAQ)
    pub exchange: Option<String>,
}

impl Ticker {
    /// 以大写代码构造身份，不附带交易所。
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            exchange: None,
        }
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// # Summary
/// K 线时间周期枚举，每个周期对应固定的毫秒时长。
///
/// # Invariants
/// - `60m` 与 `1h` 时长相同，但作为不同的数据源标签分别存在。
/// - 只允许从细粒度聚合到粗粒度 (目标时长必须是源时长的整数倍)。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "2m")]
    Minute2,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "60m")]
    Minute60,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

const MINUTE_MS: i64 = 60_000;

impl Interval {
    /// 全部周期，按时长升序排列。
    pub const ALL: [Interval; 9] = [
        Interval::Minute1,
        Interval::Minute2,
        Interval::Minute5,
        Interval::Minute15,
        Interval::Minute30,
        Interval::Minute60,
        Interval::Hour1,
        Interval::Hour4,
        Interval::Day1,
    ];

    /// # Summary
    /// 周期对应的毫秒时长。
    pub const fn duration_ms(self) -> i64 {
        match self {
            Interval::Minute1 => MINUTE_MS,
            Interval::Minute2 => 2 * MINUTE_MS,
            Interval::Minute5 => 5 * MINUTE_MS,
            Interval::Minute15 => 15 * MINUTE_MS,
            Interval::Minute30 => 30 * MINUTE_MS,
            Interval::Minute60 | Interval::Hour1 => 60 * MINUTE_MS,
            Interval::Hour4 => 240 * MINUTE_MS,
            Interval::Day1 => 1440 * MINUTE_MS,
        }
    }

    /// 周期对应的 `chrono::Duration`。
    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.duration_ms())
    }

    /// # Summary
    /// 可由当前周期聚合得到的目标周期表（含自身）。
    ///
    /// # Logic
    /// 静态查表；表内每一项的时长都是源时长的整数倍，
    /// 单元测试会用整除规则对整张表做交叉校验。
    ///
    /// # Returns
    /// 目标周期切片，按时长升序。
    pub const fn compatible_targets(self) -> &'static [Interval] {
        use Interval::*;
        match self {
            Minute1 => &[
                Minute1, Minute2, Minute5, Minute15, Minute30, Minute60, Hour1, Hour4, Day1,
            ],
            Minute2 => &[Minute2, Minute30, Minute60, Hour1, Hour4, Day1],
            Minute5 => &[Minute5, Minute15, Minute30, Minute60, Hour1, Hour4, Day1],
            Minute15 => &[Minute15, Minute30, Minute60, Hour1, Hour4, Day1],
            Minute30 => &[Minute30, Minute60, Hour1, Hour4, Day1],
            Minute60 | Hour1 => &[Minute60, Hour1, Hour4, Day1],
            Hour4 => &[Hour4, Day1],
            Day1 => &[Day1],
        }
    }

    /// 目标周期是否可由当前周期聚合得到。
    pub fn can_resample_into(self, target: Interval) -> bool {
        self.compatible_targets().contains(&target)
    }

    /// # Summary
    /// 目标周期相对当前周期的整数倍率。
    ///
    /// # Returns
    /// 兼容时返回 `Some(ratio)`，否则返回 None。
    pub fn ratio_to(self, target: Interval) -> Option<usize> {
        if !self.can_resample_into(target) {
            return None;
        }
        usize::try_from(target.duration_ms() / self.duration_ms()).ok()
    }

    /// 周期的短标签，与数据文件名中的周期段一致。
    pub const fn label(self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute2 => "2m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Minute60 => "60m",
            Interval::Hour1 => "1h",
            Interval::Hour4 => "4h",
            Interval::Day1 => "1d",
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "minute1" => Ok(Interval::Minute1),
            "2m" | "minute2" => Ok(Interval::Minute2),
            "5m" | "minute5" => Ok(Interval::Minute5),
            "15m" | "minute15" => Ok(Interval::Minute15),
            "30m" | "minute30" => Ok(Interval::Minute30),
            "60m" | "minute60" => Ok(Interval::Minute60),
            "1h" | "hour1" => Ok(Interval::Hour1),
            "4h" | "hour4" => Ok(Interval::Hour4),
            "1d" | "day1" => Ok(Interval::Day1),
            _ => Err(format!("Unknown Interval: {}", s)),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_table_matches_integer_ratio_rule() {
        for source in Interval::ALL {
            for target in Interval::ALL {
                let by_rule = target.duration_ms() >= source.duration_ms()
                    && target.duration_ms() % source.duration_ms() == 0;
                assert_eq!(
                    source.can_resample_into(target),
                    by_rule,
                    "{source} -> {target}"
                );
            }
        }
    }

    #[test]
    fn test_never_downscale() {
        assert!(!Interval::Minute5.can_resample_into(Interval::Minute1));
        assert!(!Interval::Day1.can_resample_into(Interval::Hour4));
        assert_eq!(Interval::Minute5.ratio_to(Interval::Minute1), None);
    }

    #[test]
    fn test_ratio_and_labels() {
        assert_eq!(Interval::Minute1.ratio_to(Interval::Minute5), Some(5));
        assert_eq!(Interval::Minute2.ratio_to(Interval::Minute30), Some(15));
        assert_eq!(Interval::Minute2.ratio_to(Interval::Minute15), None);
        assert_eq!(Interval::Minute60.ratio_to(Interval::Hour1), Some(1));
        for interval in Interval::ALL {
            assert_eq!(interval.label().parse::<Interval>(), Ok(interval));
        }
        assert!("7m".parse::<Interval>().is_err());
    }

    #[test]
    fn test_ticker_normalizes_symbol() {
        let t = Ticker::new(" bbca ");
        assert_eq!(t.symbol, "BBCA");
        assert_eq!(t.to_string(), "BBCA");
    }
}
