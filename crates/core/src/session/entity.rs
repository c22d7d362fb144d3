use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// # Summary
/// 交易时段配置，驱动会话分类。
///
/// # Invariants
/// - 所有时间均以 `timezone` 指定的 IANA 时区解释，与宿主机区域设置无关。
/// - `open_hour <= close_hour`，`lunch_start <= lunch_end`；两者相等表示无午休。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // 交易所时区
    pub timezone: Tz,
    // 开盘小时 (该小时内任意分钟均视为交易时段)
    pub open_hour: u32,
    // 收盘小时 (仅该小时的第 0 分钟视为交易时段)
    pub close_hour: u32,
    // 午休开始 (含)
    pub lunch_start: NaiveTime,
    // 午休结束 (不含)
    pub lunch_end: NaiveTime,
    // 额外休市日
    pub holidays: Vec<NaiveDate>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Jakarta,
            open_hour: 9,
            close_hour: 16,
            lunch_start: NaiveTime::from_hms_opt(11, 30, 0).unwrap_or(NaiveTime::MIN),
            lunch_end: NaiveTime::from_hms_opt(13, 30, 0).unwrap_or(NaiveTime::MIN),
            holidays: Vec::new(),
        }
    }
}

/// # Summary
/// 交易日内的会话阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    // 开盘前
    PreMarket,
    // 上午时段
    Session1,
    // 午休
    Lunch,
    // 下午时段
    Session2,
    // 收盘后、周末或节假日
    Closed,
}

impl SessionPhase {
    /// 该阶段是否处于连续交易中
    pub fn is_open(self) -> bool {
        matches!(self, SessionPhase::Session1 | SessionPhase::Session2)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::PreMarket => "pre-market",
            SessionPhase::Session1 => "session-1",
            SessionPhase::Lunch => "lunch",
            SessionPhase::Session2 => "session-2",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// 下一次阶段切换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    // 切换时刻 (UTC 毫秒)
    pub at_ms: i64,
    // 切换后的阶段
    pub phase: SessionPhase,
}

/// # Summary
/// 对单个时间戳的会话分类结果。
///
/// # Invariants
/// - `is_open == phase.is_open()`。
/// - 无法解析的时间戳分类为 `Closed` 且 `next_transition` 为 None。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub is_open: bool,
    pub next_transition: Option<Transition>,
}

impl SessionState {
    /// 无法分类时的回退结果
    pub fn closed() -> Self {
        Self {
            phase: SessionPhase::Closed,
            is_open: false,
            next_transition: None,
        }
    }
}
