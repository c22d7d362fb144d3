use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use rewind_cache::mem::MemCache;
use rewind_core::common::{Interval, Ticker};
use rewind_core::config::{ResampleConfig, WarmupConfig};
use rewind_core::market::entity::Candle;
use rewind_core::market::error::MarketError;
use rewind_core::market::port::CandleSource;
use rewind_core::session::entity::SessionConfig;
use rewind_core::testing::{MemCandleSource, candle, local_ms, trading_day};
use rewind_market::calendar::SessionCalendar;
use rewind_market::history_cache::HistoryCache;
use rewind_market::resample::Resampler;
use rewind_market::warmup::WarmupLoader;
use std::sync::Arc;

const JAKARTA: Tz = chrono_tz::Asia::Jakarta;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

/// 2025-01-13 为周一，前一个交易日为 01-10 (周五)
fn target() -> NaiveDate {
    date(13)
}

fn full_day(day: NaiveDate, interval: Interval) -> Vec<Candle> {
    trading_day(JAKARTA, day, interval, (9, 0), (16, 0))
}

fn loader_with(
    source: Arc<MemCandleSource>,
    session: SessionConfig,
    warmup: WarmupConfig,
) -> WarmupLoader {
    WarmupLoader::new(
        source,
        SessionCalendar::new(session),
        Resampler::new(ResampleConfig::default()),
        warmup,
    )
}

fn seeded_source(interval: Interval, days: &[u32]) -> Arc<MemCandleSource> {
    let source = Arc::new(MemCandleSource::new());
    for &d in days {
        source.insert_day("BBCA", interval, date(d), full_day(date(d), interval));
    }
    source
}

#[tokio::test]
async fn test_warmup_aggregates_one_minute_history() -> Result<()> {
    let source = seeded_source(Interval::Minute1, &[6, 7, 8, 9, 10, 13]);
    let loader = loader_with(source.clone(), SessionConfig::default(), WarmupConfig::default());

    let buffers = loader
        .load(&Ticker::new("BBCA"), target(), Interval::Minute5)
        .await?
        .expect("target day has data");

    assert_eq!(buffers.source_interval, Interval::Minute1);
    assert_eq!(buffers.display_interval, Interval::Minute5);
    assert!(buffers.was_aggregated);
    assert_eq!(buffers.history_buffer.len(), 200);
    // 每个交易日过滤后 300 根 1m，即 60 根 5m
    assert_eq!(buffers.simulation_queue.len(), 60);

    let last_history = buffers.history_buffer.last().unwrap().timestamp;
    let first_queued = buffers.simulation_queue.first().unwrap().timestamp;
    assert!(last_history < first_queued);
    assert_eq!(first_queued, local_ms(JAKARTA, target(), 9, 0));

    // 目标日 1 次 + 回溯 01-10、01-09、01-08、01-07 共 4 次，周末不读取
    assert_eq!(source.load_count(), 5);
    Ok(())
}

#[tokio::test]
async fn test_warmup_buffers_are_session_filtered() -> Result<()> {
    let source = seeded_source(Interval::Minute1, &[10]);
    let mut day = full_day(target(), Interval::Minute1);
    // 重复的开盘 K 线与收盘后的 K 线
    day.insert(1, day[0]);
    day.push(candle(local_ms(JAKARTA, target(), 17, 0), 1.0, 1.0, 1.0));
    source.insert_day("BBCA", Interval::Minute1, target(), day);

    let loader = loader_with(source, SessionConfig::default(), WarmupConfig::default());
    let buffers = loader
        .load(&Ticker::new("BBCA"), target(), Interval::Minute1)
        .await?
        .unwrap();

    assert!(!buffers.was_aggregated);
    assert_eq!(buffers.simulation_queue.len(), 300);
    assert!(buffers
        .simulation_queue
        .windows(2)
        .all(|p| p[0].timestamp < p[1].timestamp));
    let lunch = local_ms(JAKARTA, target(), 12, 0);
    assert!(buffers.simulation_queue.iter().all(|c| c.timestamp != lunch));
    assert_eq!(buffers.history_buffer.len(), 200);
    Ok(())
}

#[tokio::test]
async fn test_finest_interval_with_target_day_wins() -> Result<()> {
    let source = seeded_source(Interval::Minute5, &[10, 13]);
    // 1m 只存在于其他日期，目标日缺失
    source.insert_day(
        "BBCA",
        Interval::Minute1,
        date(10),
        full_day(date(10), Interval::Minute1),
    );

    let warmup = WarmupConfig {
        history_size: 20,
        ..WarmupConfig::default()
    };
    let loader = loader_with(source, SessionConfig::default(), warmup);
    let buffers = loader
        .load(&Ticker::new("BBCA"), target(), Interval::Minute15)
        .await?
        .unwrap();

    assert_eq!(buffers.source_interval, Interval::Minute5);
    assert_eq!(buffers.history_buffer.len(), 20);
    assert_eq!(buffers.simulation_queue.len(), 20);
    Ok(())
}

#[tokio::test]
async fn test_missing_target_day_returns_none() -> Result<()> {
    let source = seeded_source(Interval::Minute1, &[9, 10]);
    let loader = loader_with(source, SessionConfig::default(), WarmupConfig::default());

    let result = loader
        .load(&Ticker::new("BBCA"), target(), Interval::Minute5)
        .await?;
    assert!(result.is_none());

    let unknown = loader
        .load(&Ticker::new("TLKM"), target(), Interval::Minute5)
        .await?;
    assert!(unknown.is_none());
    Ok(())
}

#[tokio::test]
async fn test_backward_scan_respects_ceiling() -> Result<()> {
    let source = seeded_source(Interval::Minute1, &[6, 13]);

    let short = WarmupConfig {
        max_scan_days: 5,
        ..WarmupConfig::default()
    };
    let loader = loader_with(source.clone(), SessionConfig::default(), short);
    let buffers = loader
        .load(&Ticker::new("BBCA"), target(), Interval::Minute1)
        .await?
        .unwrap();
    assert!(buffers.history_buffer.is_empty());
    // 目标日 + 01-10、01-09、01-08
    assert_eq!(source.load_count(), 4);

    let long = WarmupConfig {
        max_scan_days: 10,
        ..WarmupConfig::default()
    };
    let loader = loader_with(source, SessionConfig::default(), long);
    let buffers = loader
        .load(&Ticker::new("BBCA"), target(), Interval::Minute1)
        .await?
        .unwrap();
    assert_eq!(buffers.history_buffer.len(), 200);
    assert!(buffers.history_buffer.iter().all(|c| c.timestamp < local_ms(JAKARTA, date(7), 0, 0)));
    Ok(())
}

#[tokio::test]
async fn test_holidays_are_not_scanned() -> Result<()> {
    let source = seeded_source(Interval::Minute1, &[9, 13]);
    let session = SessionConfig {
        holidays: vec![date(10)],
        ..SessionConfig::default()
    };
    let warmup = WarmupConfig {
        history_size: 100,
        ..WarmupConfig::default()
    };
    let loader = loader_with(source.clone(), session, warmup);
    let buffers = loader
        .load(&Ticker::new("BBCA"), target(), Interval::Minute1)
        .await?
        .unwrap();

    assert_eq!(buffers.history_buffer.len(), 100);
    assert_eq!(source.load_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_history_cache_short_circuits_scan() -> Result<()> {
    let source = seeded_source(Interval::Minute1, &[6, 7, 8, 9, 10, 13]);
    let cache = Arc::new(HistoryCache::new(Arc::new(MemCache::with_capacity(8))));
    let loader = loader_with(source.clone(), SessionConfig::default(), WarmupConfig::default())
        .with_cache(cache.clone());
    let ticker = Ticker::new("BBCA");

    let first = loader.load(&ticker, target(), Interval::Minute5).await?.unwrap();
    assert_eq!(source.load_count(), 5);

    let second = loader.load(&ticker, target(), Interval::Minute5).await?.unwrap();
    assert_eq!(source.load_count(), 6);
    assert_eq!(first, second);

    // 更小的请求直接裁剪缓存结果
    let hit = cache.get(&ticker, Interval::Minute1, target(), 10).await.unwrap();
    assert_eq!(hit.len(), 10);
    assert_eq!(hit.last(), session_tail(date(10)).as_ref());

    cache.invalidate(&ticker, Interval::Minute1).await;
    loader.load(&ticker, target(), Interval::Minute5).await?;
    assert_eq!(source.load_count(), 11);
    Ok(())
}

// 某日会话内最后一根 1m K 线
fn session_tail(day: NaiveDate) -> Option<Candle> {
    let calendar = SessionCalendar::new(SessionConfig::default());
    calendar
        .filter_session(&full_day(day, Interval::Minute1))
        .last()
        .copied()
}

#[tokio::test]
async fn test_concurrent_loads_share_one_scan() -> Result<()> {
    let source = seeded_source(Interval::Minute1, &[6, 7, 8, 9, 10, 13]);
    let cache = Arc::new(HistoryCache::new(Arc::new(MemCache::new())));
    let loader = Arc::new(
        loader_with(source.clone(), SessionConfig::default(), WarmupConfig::default())
            .with_cache(cache),
    );
    let ticker = Ticker::new("BBCA");

    let (a, b) = tokio::join!(
        loader.load(&ticker, target(), Interval::Minute5),
        loader.load(&ticker, target(), Interval::Minute5)
    );
    assert_eq!(a?, b?);
    // 两次目标日读取 + 一次 4 天回溯
    assert_eq!(source.load_count(), 6);
    Ok(())
}

/// 总是返回 I/O 错误的数据源
struct BrokenSource;

#[async_trait]
impl CandleSource for BrokenSource {
    async fn load_day(
        &self,
        _: &Ticker,
        _: NaiveDate,
        _: Interval,
    ) -> Result<Vec<Candle>, MarketError> {
        Err(MarketError::Io("disk unplugged".to_string()))
    }

    async fn available_intervals(&self, _: &Ticker) -> Result<Vec<Interval>, MarketError> {
        Ok(vec![Interval::Minute1])
    }
}

#[tokio::test]
async fn test_target_day_io_error_is_returned() {
    let loader = WarmupLoader::new(
        Arc::new(BrokenSource),
        SessionCalendar::new(SessionConfig::default()),
        Resampler::default(),
        WarmupConfig::default(),
    );
    let result = loader
        .load(&Ticker::new("BBCA"), target(), Interval::Minute5)
        .await;
    assert_eq!(result, Err(MarketError::Io("disk unplugged".to_string())));
}
