use crate::window::WindowPlanner;
use chrono::NaiveDate;
use rewind_core::common::{Interval, Ticker};
use rewind_core::market::entity::{Candle, DataIssue, Gap, IntegrityReport, Window};
use rewind_core::market::error::MarketError;
use rewind_core::market::port::BatchProvider;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// # Summary
/// 合并多个批次的下载结果。
///
/// # Logic
/// 1. 按批次首根 K 线时间排序 (空批次排在最后，排序稳定)。
/// 2. 依次拼接。
/// 3. 去重，保留首次出现的时间戳。
pub fn merge_batches(mut batches: Vec<Vec<Candle>>) -> Vec<Candle> {
    batches.sort_by_key(|b| b.first().map_or(i64::MAX, |c| c.timestamp));
    let merged: Vec<Candle> = batches.into_iter().flatten().collect();
    deduplicate_candles(&merged)
}

/// # Summary
/// 去除重复时间戳。
///
/// # Logic
/// 稳定排序后相邻去重，因此同一时间戳保留输入中最先出现的那根。
///
/// # Returns
/// 严格升序、无重复的新序列。
pub fn deduplicate_candles(series: &[Candle]) -> Vec<Candle> {
    let mut sorted = series.to_vec();
    sorted.sort_by_key(|c| c.timestamp);
    sorted.dedup_by_key(|c| c.timestamp);
    sorted
}

/// # Summary
/// 标记相邻间隔超过 `expected_ms + tolerance_ms` 的缺口。
///
/// # Arguments
/// * `series`: 升序序列。
/// * `expected_ms`: 预期间隔。
/// * `tolerance_ms`: 容差。
///
/// # Returns
/// 缺口列表，缺口本身不视为错误。
pub fn detect_gaps(series: &[Candle], expected_ms: i64, tolerance_ms: i64) -> Vec<Gap> {
    if expected_ms <= 0 {
        return Vec::new();
    }
    series
        .windows(2)
        .filter_map(|pair| {
            let delta = pair[1].timestamp - pair[0].timestamp;
            (delta > expected_ms + tolerance_ms).then(|| Gap {
                from_ms: pair[0].timestamp,
                to_ms: pair[1].timestamp,
                delta_ms: delta,
                missing_candles: delta / expected_ms - 1,
            })
        })
        .collect()
}

/// 出现次数最多的正间隔，次数相同时取较小值
fn dominant_spacing(series: &[Candle]) -> Option<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for pair in series.windows(2) {
        let delta = pair[1].timestamp - pair[0].timestamp;
        if delta > 0 {
            *counts.entry(delta).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(delta, _)| delta)
}

/// # Summary
/// 合并后数据的综合完整性报告。
///
/// # Logic
/// 1. 统计重复时间戳与逆序位置。
/// 2. 以最常见的正间隔为预期间隔、其一半为容差检测缺口。
/// 3. 无重复且有序即为有效，缺口只报告。
pub fn validate_merged_data(series: &[Candle]) -> IntegrityReport {
    let mut issues = Vec::new();
    let mut seen = HashSet::with_capacity(series.len());

    for (index, candle) in series.iter().enumerate() {
        if !seen.insert(candle.timestamp) {
            issues.push(DataIssue::Duplicate {
                timestamp: candle.timestamp,
            });
        }
        if index > 0 && candle.timestamp < series[index - 1].timestamp {
            issues.push(DataIssue::Unsorted {
                index,
                previous: series[index - 1].timestamp,
                timestamp: candle.timestamp,
            });
        }
    }
    let valid = issues.is_empty();

    let clean = deduplicate_candles(series);
    if let Some(expected) = dominant_spacing(&clean) {
        issues.extend(
            detect_gaps(&clean, expected, expected / 2)
                .into_iter()
                .map(DataIssue::Gap),
        );
    }

    IntegrityReport { valid, issues }
}

/// 批量下载的结果
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub candles: Vec<Candle>,
    // 实际抓取的窗口，携带各自的 K 线数量
    pub windows: Vec<Window>,
    pub report: IntegrityReport,
}

/// # Summary
/// 分窗口批量下载器：规划、校验、逐窗抓取、合并。
#[derive(Debug, Clone, Default)]
pub struct BatchDownloader {
    planner: WindowPlanner,
}

impl BatchDownloader {
    pub fn new(planner: WindowPlanner) -> Self {
        Self { planner }
    }

    /// # Summary
    /// 下载 `[start, end)` 区间的全部 K 线。
    ///
    /// # Logic
    /// 1. 按提供方限制规划窗口；超限窗口重新切分。
    /// 2. 逐窗口抓取，`MissingSource` 窗口跳过并告警，其他错误直接返回。
    /// 3. 合并去重后生成完整性报告。
    ///
    /// # Arguments
    /// * `provider`: 批量数据提供者。
    /// * `ticker`: 证券身份。
    /// * `interval`: 数据周期。
    /// * `start`: 起始日期 (含)。
    /// * `end`: 结束日期 (不含)。
    ///
    /// # Returns
    /// 合并后的序列、窗口明细与完整性报告。
    pub async fn download(
        &self,
        provider: &dyn BatchProvider,
        ticker: &Ticker,
        interval: Interval,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DownloadResult, MarketError> {
        let mut planned = Vec::new();
        for window in self.planner.plan(start, end, interval) {
            let check = self.planner.validate_window(&window, interval);
            if check.valid {
                planned.push(window);
            } else {
                warn!(
                    "Re-splitting window {}: {}",
                    window.id,
                    check.reason.unwrap_or_default()
                );
                planned.extend(self.planner.shrink(&window, interval));
            }
        }

        let mut batches = Vec::with_capacity(planned.len());
        let mut windows = Vec::with_capacity(planned.len());
        for mut window in planned {
            match provider.fetch_window(ticker, interval, &window).await {
                Ok(candles) => {
                    window.candle_count = candles.len();
                    batches.push(candles);
                    windows.push(window);
                }
                Err(e) if e.is_missing() => {
                    warn!("Skipping window {} for {}: {}", window.id, ticker, e);
                }
                Err(e) => return Err(e),
            }
        }

        let candles = merge_batches(batches);
        let report = validate_merged_data(&candles);
        info!(
            "Downloaded {} {} candles for {} across {} windows ({} gaps)",
            candles.len(),
            interval,
            ticker,
            windows.len(),
            report.gap_count()
        );
        Ok(DownloadResult {
            candles,
            windows,
            report,
        })
    }
}
