//! 测试辅助：内存数据源与 K 线构造函数，仅在 `test-utils` 特性下编译。

use crate::common::{Interval, Ticker};
use crate::market::entity::{Candle, Window};
use crate::market::error::MarketError;
use crate::market::port::{BatchProvider, CandleSource};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 以 (symbol, interval, date) 为键的内存数据源，并记录 `load_day` 调用次数。
#[derive(Default)]
pub struct MemCandleSource {
    days: DashMap<(String, Interval, NaiveDate), Vec<Candle>>,
    loads: AtomicUsize,
}

impl MemCandleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_day(&self, symbol: &str, interval: Interval, date: NaiveDate, candles: Vec<Candle>) {
        self.days
            .insert((symbol.to_uppercase(), interval, date), candles);
    }

    /// `load_day` 被调用的累计次数
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandleSource for MemCandleSource {
    async fn load_day(
        &self,
        ticker: &Ticker,
        date: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<Candle>, MarketError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.days
            .get(&(ticker.symbol.clone(), interval, date))
            .map(|v| v.value().clone())
            .ok_or_else(|| MarketError::MissingSource {
                ticker: ticker.symbol.clone(),
                date,
                interval,
            })
    }

    async fn available_intervals(&self, ticker: &Ticker) -> Result<Vec<Interval>, MarketError> {
        let mut intervals: Vec<Interval> = self
            .days
            .iter()
            .filter(|e| e.key().0 == ticker.symbol)
            .map(|e| e.key().1)
            .collect();
        intervals.sort();
        intervals.dedup();
        Ok(intervals)
    }
}

#[async_trait]
impl BatchProvider for MemCandleSource {
    async fn fetch_window(
        &self,
        ticker: &Ticker,
        interval: Interval,
        window: &Window,
    ) -> Result<Vec<Candle>, MarketError> {
        let candles: Vec<Candle> = self
            .days
            .iter()
            .filter(|e| {
                let (symbol, iv, date) = e.key();
                *symbol == ticker.symbol && *iv == interval && *date >= window.start && *date < window.end
            })
            .flat_map(|e| e.value().clone())
            .collect();
        Ok(candles)
    }
}

/// 构造一根满足不变量的 K 线
pub fn candle(timestamp: i64, open: f64, close: f64, volume: f64) -> Candle {
    Candle::new(
        timestamp,
        open,
        open.max(close) + 1.0,
        open.min(close) - 1.0,
        close,
        volume,
    )
}

/// 从 `start_ms` 起按 `step_ms` 等间距生成 `count` 根 K 线
pub fn series(start_ms: i64, step_ms: i64, count: usize) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let offset = i64::try_from(i).unwrap_or(i64::MAX);
            let base = 100.0 + f64::from(u32::try_from(i % 50).unwrap_or(0));
            candle(start_ms + offset * step_ms, base, base + 0.5, 1_000.0)
        })
        .collect()
}

/// 交易所本地时间对应的 UTC 毫秒
pub fn local_ms(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> i64 {
    let naive = date.and_hms_opt(hour, minute, 0).unwrap_or_default();
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_default()
}

/// 生成某交易日从 `open` 到 `close` (本地时间，不含 close) 的逐周期 K 线
pub fn trading_day(
    tz: Tz,
    date: NaiveDate,
    interval: Interval,
    open: (u32, u32),
    close: (u32, u32),
) -> Vec<Candle> {
    let start = local_ms(tz, date, open.0, open.1);
    let end = local_ms(tz, date, close.0, close.1);
    let step = interval.duration_ms();
    let count = usize::try_from((end - start) / step).unwrap_or(0);
    series(start, step, count)
}
