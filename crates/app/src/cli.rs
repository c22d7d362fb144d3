use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rewind_core::common::{Interval, Ticker};

#[derive(Debug, Parser)]
#[command(
    name = "rewind",
    version,
    about = "Historical OHLCV replay over local daily candle files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// 命令行子命令
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Load warm-up buffers for a trading day and play them headlessly
    Replay {
        #[arg(value_parser = parse_ticker)]
        ticker: Ticker,
        /// Trading day (YYYY-MM-DD)
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        /// Display interval (1m, 2m, 5m, 15m, 30m, 60m, 1h, 4h, 1d)
        interval: Interval,
        /// Playback speed multiplier, overrides the configured default
        #[arg(value_parser = parse_speed)]
        speed: Option<f64>,
    },
    /// Merge all daily files of a ticker and interval into one archive
    Merge {
        #[arg(value_parser = parse_ticker)]
        ticker: Ticker,
        interval: Interval,
    },
    /// Print provider-safe download windows for a date range
    Plan {
        #[arg(value_parser = parse_date)]
        start: NaiveDate,
        #[arg(value_parser = parse_date)]
        end: NaiveDate,
        interval: Interval,
    },
}

fn parse_ticker(raw: &str) -> Result<Ticker, String> {
    let ticker = Ticker::new(raw);
    if ticker.symbol.is_empty() {
        return Err("Ticker must not be empty".to_string());
    }
    Ok(ticker)
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("Invalid date {raw}: {e}"))
}

// 倍速必须是有限正数
fn parse_speed(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| format!("Invalid speed: {raw}"))
}
