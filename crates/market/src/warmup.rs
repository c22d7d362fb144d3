use crate::calendar::SessionCalendar;
use crate::history_cache::HistoryCache;
use crate::merge::deduplicate_candles;
use crate::resample::Resampler;
use chrono::NaiveDate;
use rewind_core::common::{Interval, Ticker};
use rewind_core::config::WarmupConfig;
use rewind_core::market::entity::Candle;
use rewind_core::market::error::MarketError;
use rewind_core::market::port::CandleSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// # Summary
/// 预热结果：静态历史上下文与待回放队列。
///
/// # Invariants
/// - 两个缓冲都已按交易时段过滤、去重并按时间升序排列。
/// - `history_buffer` 全部早于 `simulation_queue`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupBuffers {
    // 预热历史 (以展示周期计，最多 history_size 根)
    pub history_buffer: Vec<Candle>,
    // 目标交易日的待回放 K 线
    pub simulation_queue: Vec<Candle>,
    // 实际读取的源周期
    pub source_interval: Interval,
    // 展示周期
    pub display_interval: Interval,
    // 是否经过聚合
    pub was_aggregated: bool,
}

/// # Summary
/// 预热缓冲加载器，为任意起始日期组装历史与回放队列。
///
/// # Invariants
/// - 数据源、日历、聚合器与缓存均为注入依赖，无模块级状态。
pub struct WarmupLoader {
    source: Arc<dyn CandleSource>,
    calendar: SessionCalendar,
    resampler: Resampler,
    config: WarmupConfig,
    cache: Option<Arc<HistoryCache>>,
}

impl WarmupLoader {
    pub fn new(
        source: Arc<dyn CandleSource>,
        calendar: SessionCalendar,
        resampler: Resampler,
        config: WarmupConfig,
    ) -> Self {
        Self {
            source,
            calendar,
            resampler,
            config,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<HistoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// # Summary
    /// 加载 `date` 当天的回放队列及其之前的预热历史。
    ///
    /// # Logic
    /// 1. 在可用周期中按由细到粗尝试与展示周期兼容的源周期，首个在目标日有数据的胜出。
    /// 2. 目标日数据作为回放队列。
    /// 3. 向前逐日回溯 (跳过周末与节假日) 累积 `history_size × ratio` 根源 K 线，
    ///    或达到 `max_scan_days` 自然日上限为止；缓存命中时跳过回溯。
    /// 4. 源周期与展示周期不同时，两个缓冲都经过聚合。
    ///
    /// # Arguments
    /// * `ticker`: 证券身份。
    /// * `date`: 目标交易日。
    /// * `display_interval`: 展示周期。
    ///
    /// # Returns
    /// 目标日无数据时返回 `Ok(None)`，由调用方换用其他日期。
    pub async fn load(
        &self,
        ticker: &Ticker,
        date: NaiveDate,
        display_interval: Interval,
    ) -> Result<Option<WarmupBuffers>, MarketError> {
        let Some((source_interval, queue)) = self.load_target_day(ticker, date, display_interval).await?
        else {
            info!("No {} data for {} on {}", display_interval, ticker, date);
            return Ok(None);
        };

        let ratio = source_interval.ratio_to(display_interval).unwrap_or(1);
        let needed = self.config.history_size.saturating_mul(ratio);
        let history = self
            .load_history(ticker, date, source_interval, needed)
            .await?;

        let was_aggregated = source_interval != display_interval;
        let (mut history_buffer, simulation_queue) = if was_aggregated {
            (
                self.resampler
                    .resample_candles(&history, source_interval, display_interval)?,
                self.resampler
                    .resample_candles(&queue, source_interval, display_interval)?,
            )
        } else {
            (history, queue)
        };

        let excess = history_buffer
            .len()
            .saturating_sub(self.config.history_size);
        history_buffer.drain(..excess);

        info!(
            "Warm-up for {} on {}: {} history + {} queued {} candles (source {})",
            ticker,
            date,
            history_buffer.len(),
            simulation_queue.len(),
            display_interval,
            source_interval
        );
        Ok(Some(WarmupBuffers {
            history_buffer,
            simulation_queue,
            source_interval,
            display_interval,
            was_aggregated,
        }))
    }

    // 按由细到粗的顺序选出目标日有数据的源周期
    async fn load_target_day(
        &self,
        ticker: &Ticker,
        date: NaiveDate,
        display: Interval,
    ) -> Result<Option<(Interval, Vec<Candle>)>, MarketError> {
        let mut candidates: Vec<Interval> = self
            .source
            .available_intervals(ticker)
            .await?
            .into_iter()
            .filter(|iv| iv.can_resample_into(display))
            .collect();
        candidates.sort_by_key(|iv| iv.duration_ms());
        candidates.dedup();

        for interval in candidates {
            match self.source.load_day(ticker, date, interval).await {
                Ok(candles) => {
                    let clean = self.clean(&candles);
                    if !clean.is_empty() {
                        return Ok(Some((interval, clean)));
                    }
                    debug!("{} {} on {} has no in-session candles", ticker, interval, date);
                }
                Err(e) if e.is_missing() => {
                    debug!("{} {} missing on {}", ticker, interval, date);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn load_history(
        &self,
        ticker: &Ticker,
        date: NaiveDate,
        interval: Interval,
        needed: usize,
    ) -> Result<Vec<Candle>, MarketError> {
        let Some(cache) = &self.cache else {
            return Ok(self.scan_backward(ticker, date, interval, needed).await);
        };

        let _guard = cache.lock(ticker, interval).await;
        if let Some(history) = cache.get(ticker, interval, date, needed).await {
            return Ok(history);
        }
        let history = self.scan_backward(ticker, date, interval, needed).await;
        cache.put(ticker, interval, date, needed, &history).await;
        Ok(history)
    }

    /// # Summary
    /// 从 `date` 前一天开始逐日回溯。
    ///
    /// # Logic
    /// 缺失或读取失败的日期跳过；按自然日计数，超过 `max_scan_days` 停止。
    async fn scan_backward(
        &self,
        ticker: &Ticker,
        date: NaiveDate,
        interval: Interval,
        needed: usize,
    ) -> Vec<Candle> {
        let mut days: Vec<Vec<Candle>> = Vec::new();
        let mut collected = 0;
        let mut day = date;

        for _ in 0..self.config.max_scan_days {
            if collected >= needed {
                break;
            }
            let Some(prev) = day.pred_opt() else {
                break;
            };
            day = prev;
            if !self.calendar.is_trading_day(day) {
                continue;
            }
            match self.source.load_day(ticker, day, interval).await {
                Ok(candles) => {
                    let clean = self.clean(&candles);
                    debug!("Scanned {} {} on {}: {} candles", ticker, interval, day, clean.len());
                    collected += clean.len();
                    days.push(clean);
                }
                Err(e) if e.is_missing() => {
                    debug!("{} {} missing on {}, skipping", ticker, interval, day);
                }
                Err(e) => {
                    warn!("Skipping {} {} on {}: {}", ticker, interval, day, e);
                }
            }
        }

        if collected < needed {
            debug!(
                "Backward scan for {} {} stopped with {}/{} candles",
                ticker, interval, collected, needed
            );
        }

        days.reverse();
        let mut history = deduplicate_candles(&days.concat());
        let excess = history.len().saturating_sub(needed);
        history.drain(..excess);
        history
    }

    fn clean(&self, candles: &[Candle]) -> Vec<Candle> {
        deduplicate_candles(&self.calendar.filter_session(candles))
    }
}
