use anyhow::Result;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use rewind_core::common::time::VirtualClock;
use rewind_core::common::{Interval, Ticker};
use rewind_core::config::{ProviderLimits, ResampleConfig, WarmupConfig};
use rewind_core::market::entity::Candle;
use rewind_core::market::error::MarketError;
use rewind_core::market::port::CandleSource;
use rewind_core::session::entity::SessionConfig;
use rewind_core::testing::{series, trading_day};
use rewind_feed::archive::{ArchiveWriter, read_archive};
use rewind_feed::local::LocalFileSource;
use rewind_market::calendar::SessionCalendar;
use rewind_market::merge::BatchDownloader;
use rewind_market::resample::Resampler;
use rewind_market::warmup::WarmupLoader;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const MIN: i64 = 60_000;
// 2025-01-06 02:00:00 UTC
const TS: i64 = 1_736_128_800_000;
const DAY_MS: i64 = 86_400_000;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

fn write_day(dir: &Path, symbol: &str, interval: Interval, day: NaiveDate, candles: &[Candle]) -> Result<()> {
    let rows: Vec<Value> = candles
        .iter()
        .map(|c| json!({"t": c.timestamp, "o": c.open, "h": c.high, "l": c.low, "c": c.close, "v": c.volume}))
        .collect();
    let name = format!("{}_{}_{}.json", symbol, interval.label(), day.format("%Y-%m-%d"));
    std::fs::write(dir.join(name), serde_json::to_vec(&json!({ "candles": rows }))?)?;
    Ok(())
}

// 1 月 d 日 02:00 UTC 起的三根 1m K 线
fn morning(d: u32) -> Vec<Candle> {
    series(TS + i64::from(d - 6) * DAY_MS, MIN, 3)
}

#[tokio::test]
async fn test_load_day_normalizes_time_only_rows() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(
        dir.path().join("BBCA_1m_2025-01-06.json"),
        r#"[
            {"time": "02:01", "open": 2, "high": 3, "low": 1, "close": 2.5, "volume": 10},
            {"time": "02:00", "open": 1, "high": 2, "low": 0.5, "close": 1.5, "vol": 7},
            {"time": "bogus", "open": 1, "high": 1, "low": 1, "close": 1}
        ]"#,
    )?;
    std::fs::write(dir.path().join("BBCA_1m_2025-01-07.json"), "not json")?;

    let source = LocalFileSource::new(dir.path());
    let ticker = Ticker::new("bbca");
    let candles = source.load_day(&ticker, date(6), Interval::Minute1).await?;
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0], Candle::new(TS, 1.0, 2.0, 0.5, 1.5, 7.0));
    assert_eq!(candles[1].timestamp, TS + MIN);

    let missing = source.load_day(&ticker, date(8), Interval::Minute1).await;
    assert!(matches!(missing, Err(e) if e.is_missing()));

    let corrupt = source.load_day(&ticker, date(7), Interval::Minute1).await;
    assert!(matches!(corrupt, Err(MarketError::Parse(_))));
    Ok(())
}

#[tokio::test]
async fn test_discovery_ignores_merged_outputs() -> Result<()> {
    let dir = TempDir::new()?;
    write_day(dir.path(), "BBCA", Interval::Minute5, date(7), &morning(7))?;
    write_day(dir.path(), "BBCA", Interval::Minute1, date(7), &morning(7))?;
    write_day(dir.path(), "BBCA", Interval::Minute1, date(6), &morning(6))?;
    write_day(dir.path(), "ADRO", Interval::Minute15, date(6), &morning(6))?;
    std::fs::write(dir.path().join("BBCA_1h_MERGED.json"), "{}")?;
    std::fs::write(dir.path().join("BBCA_4h_30days_2025-01-06.json"), "[]")?;
    std::fs::write(dir.path().join("notes.txt"), "")?;

    let source = LocalFileSource::new(dir.path());
    let ticker = Ticker::new("BBCA");
    assert_eq!(
        source.available_intervals(&ticker).await?,
        vec![Interval::Minute1, Interval::Minute5]
    );
    assert_eq!(source.list_days(&ticker, Interval::Minute1).await?, vec![date(6), date(7)]);

    let absent = LocalFileSource::new(dir.path().join("nope"));
    assert!(absent.available_intervals(&ticker).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_batch_download_over_daily_files() -> Result<()> {
    let dir = TempDir::new()?;
    for d in 6..=10 {
        write_day(dir.path(), "BBCA", Interval::Minute1, date(d), &morning(d))?;
    }
    let source = LocalFileSource::new(dir.path());
    let downloader = BatchDownloader::new(rewind_market::window::WindowPlanner::new(ProviderLimits::default()));

    let result = downloader
        .download(&source, &Ticker::new("BBCA"), Interval::Minute1, date(1), date(20))
        .await?;

    // 7 天窗口：[01, 08) [08, 15) [15, 20)，最后一个窗口没有文件被跳过
    assert_eq!(result.windows.len(), 2);
    assert_eq!(result.windows[0].candle_count, 6);
    assert_eq!(result.windows[1].candle_count, 9);
    assert_eq!(result.candles.len(), 15);
    assert!(result.report.is_sorted());
    assert_eq!(result.report.duplicate_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_archive_consolidation() -> Result<()> {
    let dir = TempDir::new()?;
    write_day(dir.path(), "BBCA", Interval::Minute1, date(7), &morning(7))?;
    write_day(dir.path(), "BBCA", Interval::Minute1, date(6), &morning(6))?;
    write_day(dir.path(), "ADRO", Interval::Minute1, date(6), &morning(6))?;
    std::fs::write(dir.path().join("BBCA_1m_2025-01-08.json"), "not json")?;
    std::fs::write(dir.path().join("BBCA_1m_MERGED.json"), "stale")?;
    std::fs::write(dir.path().join("BBCA_1m_2days_(2025-01-06_2025-01-07).json"), "[]")?;

    let clock = Arc::new(VirtualClock::new(TS + 10 * DAY_MS));
    let writer = ArchiveWriter::new(LocalFileSource::new(dir.path()), clock);
    let ticker = Ticker::new("BBCA");
    let archive = writer.consolidate(&ticker, Interval::Minute1).await?;

    assert_eq!(archive.candles.len(), 6);
    assert_eq!(archive.metadata.total_candles, 6);
    assert_eq!(archive.metadata.source_file_count, 2);
    assert_eq!(archive.metadata.duration_days, 1);
    assert_eq!(archive.metadata.data_start, DateTime::from_timestamp_millis(TS).unwrap());
    assert_eq!(
        archive.metadata.generated_at,
        DateTime::from_timestamp_millis(TS + 10 * DAY_MS).unwrap()
    );

    assert!(!dir.path().join("BBCA_1m_2days_(2025-01-06_2025-01-07).json").exists());
    let path = writer.archive_path(&ticker, Interval::Minute1);
    assert_eq!(read_archive(&path).await?, archive);
    assert!(dir.path().join("ADRO_1m_2025-01-06.json").exists());

    let empty = writer.consolidate(&ticker, Interval::Minute5).await;
    assert!(matches!(empty, Err(MarketError::NoDailyFiles { .. })));
    Ok(())
}

#[tokio::test]
async fn test_warmup_from_local_files() -> Result<()> {
    let jakarta: Tz = chrono_tz::Asia::Jakarta;
    let dir = TempDir::new()?;
    // 01-11/12 为周末
    for d in [9, 10, 13] {
        let day = date(d);
        write_day(
            dir.path(),
            "BBCA",
            Interval::Minute5,
            day,
            &trading_day(jakarta, day, Interval::Minute5, (9, 0), (16, 0)),
        )?;
    }

    let loader = WarmupLoader::new(
        Arc::new(LocalFileSource::new(dir.path())),
        SessionCalendar::new(SessionConfig::default()),
        Resampler::new(ResampleConfig::default()),
        WarmupConfig {
            max_scan_days: 10,
            ..WarmupConfig::default()
        },
    );
    let buffers = loader
        .load(&Ticker::new("BBCA"), date(13), Interval::Minute15)
        .await?
        .unwrap();

    assert_eq!(buffers.source_interval, Interval::Minute5);
    assert!(buffers.was_aggregated);
    assert!(!buffers.simulation_queue.is_empty());
    let queue_start = buffers.simulation_queue[0].timestamp;
    assert!(buffers.history_buffer.iter().all(|c| c.timestamp < queue_start));
    assert!(!buffers.history_buffer.is_empty());

    assert!(loader.load(&Ticker::new("BBCA"), date(14), Interval::Minute15).await?.is_none());
    Ok(())
}
