mod cli;

use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use cli::{Cli, Command};
use rewind_cache::mem::MemCache;
use rewind_core::common::time::SystemClock;
use rewind_core::common::{Interval, Ticker};
use rewind_core::config::AppConfig;
use rewind_core::replay::entity::ReplayEvent;
use rewind_engine::host::ReplayHost;
use rewind_engine::replay::TickReplayEngine;
use rewind_feed::archive::ArchiveWriter;
use rewind_feed::local::LocalFileSource;
use rewind_market::calendar::SessionCalendar;
use rewind_market::history_cache::HistoryCache;
use rewind_market::resample::Resampler;
use rewind_market::warmup::WarmupLoader;
use rewind_market::window::WindowPlanner;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// # Summary
/// 命令行入口，负责装配具体实现并分派子命令。
///
/// # Logic
/// 1. 初始化日志 (`RUST_LOG`，默认 info)。
/// 2. 加载配置：可选的 `rewind.toml` 叠加 `REWIND__*` 环境变量。
/// 3. 解析子命令并执行。
#[tokio::main]
async fn main() -> AppResult<()> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .init();

    let command = Cli::parse().command;
    let config = load_config()?;
    debug!("Loaded config: {:?}", config);

    match command {
        Command::Replay {
            ticker,
            date,
            interval,
            speed,
        } => replay(&config, &ticker, date, interval, speed).await,
        Command::Merge { ticker, interval } => merge(&config, &ticker, interval).await,
        Command::Plan {
            start,
            end,
            interval,
        } => {
            plan(&config, start, end, interval);
            Ok(())
        }
    }
}

fn load_config() -> AppResult<AppConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name("rewind").required(false))
        .add_source(
            config::Environment::with_prefix("REWIND")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    Ok(config)
}

/// # Summary
/// 加载预热缓冲并在宿主任务中回放，直到播放完成或收到 Ctrl-C。
async fn replay(
    config: &AppConfig,
    ticker: &Ticker,
    date: NaiveDate,
    interval: Interval,
    speed: Option<f64>,
) -> AppResult<()> {
    let cache = Arc::new(HistoryCache::new(Arc::new(MemCache::with_capacity(
        config.warmup.cache_capacity,
    ))));
    let loader = WarmupLoader::new(
        Arc::new(LocalFileSource::new(&config.data.data_dir)),
        SessionCalendar::new(config.session.clone()),
        Resampler::new(config.resample.clone()),
        config.warmup.clone(),
    )
    .with_cache(cache);

    let Some(buffers) = loader.load(ticker, date, interval).await? else {
        warn!("No {} data for {} on {}, pick another date", interval, ticker, date);
        return Ok(());
    };
    info!(
        "Warm-up ready: {} history / {} queued {} candles (source {}, aggregated: {})",
        buffers.history_buffer.len(),
        buffers.simulation_queue.len(),
        buffers.display_interval,
        buffers.source_interval,
        buffers.was_aggregated
    );

    let mut settings = config.replay.clone();
    if let Some(speed) = speed {
        settings.speed = speed;
    }
    let (engine, mut events) = TickReplayEngine::new(
        &buffers.simulation_queue,
        buffers.display_interval,
        &settings,
        Arc::new(SystemClock),
    );
    info!("Replaying at {}x, one tick every {:?}", settings.speed, engine.tick_interval());

    let (handle, task) = ReplayHost::spawn(engine);
    handle.play()?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ReplayEvent::CandleChanged { index, candle }) => info!(
                    "Candle #{} @ {}: O {} H {} L {} C {} V {}",
                    index, candle.timestamp, candle.open, candle.high, candle.low, candle.close, candle.volume
                ),
                Some(ReplayEvent::TickAdvanced { tick, partial }) => debug!(
                    "Tick {}/{} price {} (partial close {}, volume {})",
                    tick.candle_index, tick.tick_index, tick.price, partial.close, partial.volume
                ),
                Some(ReplayEvent::Progress(progress)) => debug!(
                    "Progress {:.1}%",
                    progress.fraction * 100.0
                ),
                Some(ReplayEvent::PlaybackComplete) => {
                    info!("Playback complete");
                    break;
                }
                None => break,
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Err(e) = handle.shutdown() {
        debug!("Replay host already stopped: {}", e);
    }
    task.await?;
    Ok(())
}

/// 合并日文件为 `{TICKER}_{INTERVAL}_MERGED.json`
async fn merge(config: &AppConfig, ticker: &Ticker, interval: Interval) -> AppResult<()> {
    let writer = ArchiveWriter::new(
        LocalFileSource::new(&config.data.data_dir),
        Arc::new(SystemClock),
    );
    let archive = writer.consolidate(ticker, interval).await?;
    println!(
        "{} {}: {} candles from {} files, {} to {} ({} days) -> {}",
        archive.ticker,
        archive.interval,
        archive.metadata.total_candles,
        archive.metadata.source_file_count,
        archive.metadata.data_start.to_rfc3339(),
        archive.metadata.data_end.to_rfc3339(),
        archive.metadata.duration_days,
        writer.archive_path(ticker, interval).display()
    );
    Ok(())
}

fn plan(config: &AppConfig, start: NaiveDate, end: NaiveDate, interval: Interval) {
    let planner = WindowPlanner::new(config.provider.clone());
    let windows = planner.plan(start, end, interval);
    println!(
        "{} windows of up to {} days for {}",
        windows.len(),
        planner.recommended_window_days(interval),
        interval
    );
    for window in windows {
        println!("{}\t{} days", window.id, window.days());
    }
}
