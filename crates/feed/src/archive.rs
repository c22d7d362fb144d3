use crate::local::LocalFileSource;
use chrono::{DateTime, Utc};
use rewind_core::common::time::Clock;
use rewind_core::common::{Interval, Ticker};
use rewind_core::market::entity::Candle;
use rewind_core::market::error::MarketError;
use rewind_market::merge::merge_batches;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

// 需要在重新合并前清理的旧产物标记
const STALE_MARKERS: [&str; 3] = ["MERGED", "COMBINED", "days"];

/// # Summary
/// 合并档案的元数据。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    // 首根 K 线时间
    pub data_start: DateTime<Utc>,
    // 末根 K 线时间
    pub data_end: DateTime<Utc>,
    pub total_candles: usize,
    // 首尾之间的完整天数
    pub duration_days: i64,
    pub generated_at: DateTime<Utc>,
    // 成功读取的日文件数量
    pub source_file_count: usize,
}

/// # Summary
/// 某证券某周期的合并档案 `{SYMBOL}_{INTERVAL}_MERGED.json`。
///
/// # Invariants
/// - `candles` 严格升序、无重复时间戳。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub ticker: String,
    pub interval: Interval,
    pub metadata: ArchiveMetadata,
    pub candles: Vec<Candle>,
}

/// 合并档案文件名
pub fn archive_file_name(ticker: &Ticker, interval: Interval) -> String {
    format!("{}_{}_MERGED.json", ticker.symbol, interval.label())
}

/// # Summary
/// 把目录中的日文件合并为单个档案文件。
pub struct ArchiveWriter {
    source: LocalFileSource,
    clock: Arc<dyn Clock>,
}

impl ArchiveWriter {
    pub fn new(source: LocalFileSource, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    pub fn archive_path(&self, ticker: &Ticker, interval: Interval) -> PathBuf {
        self.source.root().join(archive_file_name(ticker, interval))
    }

    /// # Summary
    /// 删除旧的合并产物 (文件名含 MERGED / COMBINED / days)。
    ///
    /// # Returns
    /// 实际删除的文件数；单个文件删除失败只记录告警。
    pub async fn sanitize(&self, ticker: &Ticker, interval: Interval) -> Result<usize, MarketError> {
        let prefix = format!("{}_{}_", ticker.symbol, interval.label());
        let mut dir = match tokio::fs::read_dir(self.source.root()).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(MarketError::Io(e.to_string())),
        };

        let mut removed = 0;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| MarketError::Io(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let stale = name.starts_with(&prefix)
                && name.ends_with(".json")
                && STALE_MARKERS.iter().any(|m| name.contains(m));
            if !stale {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    info!("Removed stale archive {}", name);
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", name, e),
            }
        }
        Ok(removed)
    }

    /// # Summary
    /// 执行一次完整的合并。
    ///
    /// # Logic
    /// 1. 清理旧产物。
    /// 2. 发现日文件并按日期排序。
    /// 3. 逐个读取，失败的文件告警后跳过。
    /// 4. 合并去重，计算元数据，写出格式化 JSON。
    ///
    /// # Returns
    /// 写出的档案；没有任何可用数据时返回 `NoDailyFiles`。
    pub async fn consolidate(&self, ticker: &Ticker, interval: Interval) -> Result<Archive, MarketError> {
        self.sanitize(ticker, interval).await?;

        let files = self.source.daily_files(ticker, interval).await?;
        let no_data = || MarketError::NoDailyFiles {
            ticker: ticker.symbol.clone(),
            interval,
        };
        if files.is_empty() {
            return Err(no_data());
        }
        info!("Found {} daily {} files for {}", files.len(), interval, ticker);

        let mut batches = Vec::with_capacity(files.len());
        for file in &files {
            match self.source.read_file(&file.path, file.date).await {
                Ok(candles) => batches.push(candles),
                Err(e) => warn!("Skipping {}: {}", file.path.display(), e),
            }
        }
        let source_file_count = batches.len();
        let candles = merge_batches(batches);

        let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
            return Err(no_data());
        };
        let (Some(data_start), Some(data_end)) = (first.time(), last.time()) else {
            return Err(MarketError::MalformedTimestamp(format!(
                "{}..{}",
                first.timestamp, last.timestamp
            )));
        };

        let archive = Archive {
            ticker: ticker.symbol.clone(),
            interval,
            metadata: ArchiveMetadata {
                data_start,
                data_end,
                total_candles: candles.len(),
                duration_days: (data_end - data_start).num_days(),
                generated_at: self.clock.now().unwrap_or_default(),
                source_file_count,
            },
            candles,
        };

        let path = self.archive_path(ticker, interval);
        let body = serde_json::to_vec_pretty(&archive).map_err(|e| MarketError::Parse(e.to_string()))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| MarketError::Io(format!("{}: {}", path.display(), e)))?;
        info!(
            "Wrote {} ({} candles from {} files)",
            path.display(),
            archive.metadata.total_candles,
            source_file_count
        );
        Ok(archive)
    }
}

/// 读取合并档案
pub async fn read_archive(path: &Path) -> Result<Archive, MarketError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| MarketError::Io(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes).map_err(|e| MarketError::Parse(e.to_string()))
}
