use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Weekday};
use rewind_core::market::entity::Candle;
use rewind_core::session::entity::{SessionConfig, SessionPhase, SessionState, Transition};
use tracing::warn;

// 查找下一个交易日时的最大步数，避免节假日配置异常导致死循环
const MAX_DAY_SEARCH: u32 = 366;

/// # Summary
/// 交易日历，按配置的交易所时区对时间戳进行会话分类。
///
/// # Invariants
/// - 所有计算均在 `SessionConfig::timezone` 中进行，与宿主机区域设置无关。
/// - 分类永不失败：无法解析的时间戳记录日志后归为 `Closed`。
#[derive(Debug, Clone)]
pub struct SessionCalendar {
    config: SessionConfig,
}

impl SessionCalendar {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// 当前配置的副本
    pub fn config(&self) -> SessionConfig {
        self.config.clone()
    }

    /// # Summary
    /// 对 UTC 毫秒时间戳进行会话分类。
    ///
    /// # Logic
    /// 1. 将时间戳转换到交易所时区；超出范围时告警并返回 `Closed`。
    /// 2. 非交易日 (周末/节假日) 归为 `Closed`，下一次切换为下个交易日零点的 `PreMarket`。
    /// 3. 交易日内按开盘前、上午、午休、下午、收盘后依次判定，并计算下一次切换时刻。
    ///
    /// # Arguments
    /// * `timestamp_ms`: UTC 毫秒时间戳。
    ///
    /// # Returns
    /// 会话阶段、是否开市以及下一次阶段切换。
    pub fn classify(&self, timestamp_ms: i64) -> SessionState {
        let Some(utc) = DateTime::from_timestamp_millis(timestamp_ms) else {
            warn!("Unparseable timestamp {} classified as closed", timestamp_ms);
            return SessionState::closed();
        };
        let local = utc.with_timezone(&self.config.timezone);
        let date = local.date_naive();
        let time = local.time();

        let phase = self.phase_at(date, time);
        let next_transition = self.next_transition(date, phase);
        SessionState {
            phase,
            is_open: phase.is_open(),
            next_transition,
        }
    }

    /// # Summary
    /// 对字符串形式的时间戳进行分类。
    ///
    /// # Logic
    /// 依次尝试 RFC 3339 与整数毫秒；都失败时告警并返回 `Closed`，绝不报错。
    pub fn classify_str(&self, raw: &str) -> SessionState {
        let trimmed = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return self.classify(dt.timestamp_millis());
        }
        if let Ok(ms) = trimmed.parse::<i64>() {
            return self.classify(ms);
        }
        warn!("Malformed timestamp '{}' classified as closed", raw);
        SessionState::closed()
    }

    /// # Summary
    /// 本地时刻是否处于交易时间内 (不考虑午休与交易日)。
    ///
    /// # Logic
    /// - 开盘小时内任意分钟均接受。
    /// - 收盘小时仅接受第 0 分钟。
    /// - 晚于收盘小时一律拒绝。
    pub fn is_within_trading_hours(&self, time: NaiveTime) -> bool {
        let (hour, minute) = (time.hour(), time.minute());
        if hour < self.config.open_hour {
            false
        } else if hour == self.config.open_hour {
            true
        } else if hour < self.config.close_hour {
            true
        } else if hour == self.config.close_hour {
            minute == 0
        } else {
            false
        }
    }

    /// 本地时刻是否处于午休区间 `[lunch_start, lunch_end)`
    pub fn is_lunch_break(&self, time: NaiveTime) -> bool {
        time >= self.config.lunch_start && time < self.config.lunch_end
    }

    /// 交易所本地日期是否为交易日
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
            && !self.config.holidays.contains(&date)
    }

    /// 严格早于 `date` 的最近一个交易日
    pub fn previous_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let mut day = date;
        for _ in 0..MAX_DAY_SEARCH {
            day = day.pred_opt()?;
            if self.is_trading_day(day) {
                return Some(day);
            }
        }
        None
    }

    /// 严格晚于 `date` 的最近一个交易日
    pub fn next_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let mut day = date;
        for _ in 0..MAX_DAY_SEARCH {
            day = day.succ_opt()?;
            if self.is_trading_day(day) {
                return Some(day);
            }
        }
        None
    }

    /// 时间戳在交易所时区下的日期
    pub fn local_date(&self, timestamp_ms: i64) -> Option<NaiveDate> {
        DateTime::from_timestamp_millis(timestamp_ms)
            .map(|utc| utc.with_timezone(&self.config.timezone).date_naive())
    }

    /// # Summary
    /// 仅保留处于连续交易阶段 (上午/下午) 的 K 线。
    ///
    /// # Returns
    /// 过滤后的新序列，输入不被修改。
    pub fn filter_session(&self, series: &[Candle]) -> Vec<Candle> {
        series
            .iter()
            .filter(|c| {
                DateTime::from_timestamp_millis(c.timestamp)
                    .map(|utc| {
                        let local = utc.with_timezone(&self.config.timezone);
                        self.phase_at(local.date_naive(), local.time()).is_open()
                    })
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    fn has_lunch(&self) -> bool {
        self.config.lunch_start < self.config.lunch_end
    }

    fn phase_at(&self, date: NaiveDate, time: NaiveTime) -> SessionPhase {
        if !self.is_trading_day(date) {
            return SessionPhase::Closed;
        }
        if time.hour() < self.config.open_hour {
            return SessionPhase::PreMarket;
        }
        if !self.is_within_trading_hours(time) {
            return SessionPhase::Closed;
        }
        if !self.has_lunch() {
            return SessionPhase::Session1;
        }
        if self.is_lunch_break(time) {
            SessionPhase::Lunch
        } else if time < self.config.lunch_start {
            SessionPhase::Session1
        } else {
            SessionPhase::Session2
        }
    }

    fn next_transition(&self, date: NaiveDate, phase: SessionPhase) -> Option<Transition> {
        let open = NaiveTime::from_hms_opt(self.config.open_hour, 0, 0)?;
        let after_close = NaiveTime::from_hms_opt(self.config.close_hour, 1, 0)?;

        let (at_date, at_time, next_phase) = match phase {
            SessionPhase::PreMarket => (date, open, SessionPhase::Session1),
            SessionPhase::Session1 if self.has_lunch() => {
                (date, self.config.lunch_start, SessionPhase::Lunch)
            }
            SessionPhase::Session1 | SessionPhase::Session2 => {
                (date, after_close, SessionPhase::Closed)
            }
            SessionPhase::Lunch => (date, self.config.lunch_end, SessionPhase::Session2),
            SessionPhase::Closed => {
                // 收盘后与非交易日都切换到下一个交易日零点
                (
                    self.next_trading_day(date)?,
                    NaiveTime::MIN,
                    SessionPhase::PreMarket,
                )
            }
        };

        self.local_to_ms(at_date, at_time).map(|at_ms| Transition {
            at_ms,
            phase: next_phase,
        })
    }

    fn local_to_ms(&self, date: NaiveDate, time: NaiveTime) -> Option<i64> {
        let naive = date.and_time(time);
        let tz = self.config.timezone;
        tz.from_local_datetime(&naive)
            .earliest()
            // 夏令时跳变造成的不存在时刻，顺延一小时
            .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
            .map(|dt| dt.timestamp_millis())
    }
}
