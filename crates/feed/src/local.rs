use crate::normalize::normalize_payload;
use async_trait::async_trait;
use chrono::NaiveDate;
use rewind_core::common::{Interval, Ticker};
use rewind_core::market::entity::{Candle, Window};
use rewind_core::market::error::MarketError;
use rewind_core::market::port::{BatchProvider, CandleSource};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// 合并产物与历史遗留文件的标记，日文件发现时一律排除
const EXCLUDED_MARKERS: [&str; 4] = ["MERGED", "COMBINED", "days", "_full_"];

/// # Summary
/// 目录中的一个日文件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyFile {
    pub symbol: String,
    pub interval: Interval,
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// # Summary
/// 生成日文件名 `{SYMBOL}_{INTERVAL}_{YYYY-MM-DD}.json`。
pub fn daily_file_name(ticker: &Ticker, interval: Interval, date: NaiveDate) -> String {
    format!(
        "{}_{}_{}.json",
        ticker.symbol,
        interval.label(),
        date.format("%Y-%m-%d")
    )
}

/// # Summary
/// 解析日文件名。
///
/// # Logic
/// 1. 必须以 `.json` 结尾，且不含合并产物标记。
/// 2. 从右侧切出日期与周期段，其余部分为证券代码 (允许含下划线)。
/// 3. 周期段必须是规范短标签。
///
/// # Returns
/// `(symbol, interval, date)`，不符合命名规则时返回 None。
pub fn parse_daily_name(file_name: &str) -> Option<(String, Interval, NaiveDate)> {
    let stem = file_name.strip_suffix(".json")?;
    if EXCLUDED_MARKERS.iter().any(|m| stem.contains(m)) {
        return None;
    }
    let mut parts = stem.rsplitn(3, '_');
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
    let label = parts.next()?;
    let interval = Interval::ALL.into_iter().find(|i| i.label() == label)?;
    let symbol = parts.next().filter(|s| !s.is_empty())?;
    Some((symbol.to_uppercase(), interval, date))
}

/// # Summary
/// 基于本地目录的数据源，每个 (证券, 周期, 交易日) 对应一个 JSON 文件。
///
/// # Invariants
/// - 读取到的数据在此处完成归一化，向外只暴露 `Candle`。
/// - 文件不存在映射为 `MissingSource`，其余 I/O 错误映射为 `Io`。
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    root: PathBuf,
}

impl LocalFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn daily_path(&self, ticker: &Ticker, interval: Interval, date: NaiveDate) -> PathBuf {
        self.root.join(daily_file_name(ticker, interval, date))
    }

    /// # Summary
    /// 扫描目录中全部符合命名规则的日文件。
    ///
    /// # Returns
    /// 按 (代码, 周期, 日期) 排序的列表；目录不存在时返回空列表。
    pub async fn scan(&self) -> Result<Vec<DailyFile>, MarketError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Data directory {} does not exist", self.root.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(MarketError::Io(e.to_string())),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| MarketError::Io(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some((symbol, interval, date)) = parse_daily_name(name) {
                files.push(DailyFile {
                    symbol,
                    interval,
                    date,
                    path: entry.path(),
                });
            }
        }
        files.sort_by(|a, b| {
            (&a.symbol, a.interval, a.date).cmp(&(&b.symbol, b.interval, b.date))
        });
        Ok(files)
    }

    /// 某证券某周期的日文件，按日期升序
    pub async fn daily_files(
        &self,
        ticker: &Ticker,
        interval: Interval,
    ) -> Result<Vec<DailyFile>, MarketError> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|f| f.symbol == ticker.symbol && f.interval == interval)
            .collect())
    }

    /// 某证券某周期存在数据的日期，升序
    pub async fn list_days(
        &self,
        ticker: &Ticker,
        interval: Interval,
    ) -> Result<Vec<NaiveDate>, MarketError> {
        Ok(self
            .daily_files(ticker, interval)
            .await?
            .into_iter()
            .map(|f| f.date)
            .collect())
    }

    /// # Summary
    /// 读取并归一化单个日文件。
    pub async fn read_file(&self, path: &Path, date: NaiveDate) -> Result<Vec<Candle>, MarketError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| MarketError::Io(format!("{}: {}", path.display(), e)))?;
        normalize_payload(&bytes, Some(date))
    }
}

#[async_trait]
impl CandleSource for LocalFileSource {
    async fn load_day(
        &self,
        ticker: &Ticker,
        date: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<Candle>, MarketError> {
        let path = self.daily_path(ticker, interval, date);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MarketError::MissingSource {
                    ticker: ticker.symbol.clone(),
                    date,
                    interval,
                });
            }
            Err(e) => return Err(MarketError::Io(format!("{}: {}", path.display(), e))),
        };
        let candles = normalize_payload(&bytes, Some(date))?;
        debug!("Loaded {} candles from {}", candles.len(), path.display());
        Ok(candles)
    }

    async fn available_intervals(&self, ticker: &Ticker) -> Result<Vec<Interval>, MarketError> {
        let intervals: BTreeSet<Interval> = self
            .scan()
            .await?
            .into_iter()
            .filter(|f| f.symbol == ticker.symbol)
            .map(|f| f.interval)
            .collect();
        Ok(intervals.into_iter().collect())
    }
}

#[async_trait]
impl BatchProvider for LocalFileSource {
    /// # Summary
    /// 读取窗口 `[start, end)` 内全部日文件并拼接。
    ///
    /// # Returns
    /// 窗口内一个文件都没有时返回 `MissingSource` (日期为窗口起点)。
    async fn fetch_window(
        &self,
        ticker: &Ticker,
        interval: Interval,
        window: &Window,
    ) -> Result<Vec<Candle>, MarketError> {
        let files: Vec<DailyFile> = self
            .daily_files(ticker, interval)
            .await?
            .into_iter()
            .filter(|f| f.date >= window.start && f.date < window.end)
            .collect();
        if files.is_empty() {
            return Err(MarketError::MissingSource {
                ticker: ticker.symbol.clone(),
                date: window.start,
                interval,
            });
        }

        let mut candles = Vec::new();
        for file in &files {
            candles.extend(self.read_file(&file.path, file.date).await?);
        }
        debug!(
            "Window {} yielded {} candles from {} files",
            window.id,
            candles.len(),
            files.len()
        );
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_daily_name() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        assert_eq!(
            parse_daily_name("BBCA_1m_2025-01-06.json"),
            Some(("BBCA".to_string(), Interval::Minute1, date))
        );
        assert_eq!(
            parse_daily_name("BRK_B_60m_2025-01-06.json"),
            Some(("BRK_B".to_string(), Interval::Minute60, date))
        );
        assert_eq!(parse_daily_name("BBCA_1m_MERGED.json"), None);
        assert_eq!(parse_daily_name("BBCA_1m_COMBINED_2025-01-06.json"), None);
        assert_eq!(parse_daily_name("BBCA_1m_30days_2025-01-06.json"), None);
        assert_eq!(parse_daily_name("BBCA_1m_full_2025-01-06.json"), None);
        assert_eq!(parse_daily_name("BBCA_minute1_2025-01-06.json"), None);
        assert_eq!(parse_daily_name("BBCA_1m_2025-01-06.csv"), None);
        assert_eq!(parse_daily_name("1m_2025-01-06.json"), None);
    }

    #[test]
    fn test_daily_file_name_round_trips() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let name = daily_file_name(&Ticker::new("adro"), Interval::Minute5, date);
        assert_eq!(name, "ADRO_5m_2025-03-14.json");
        assert_eq!(
            parse_daily_name(&name),
            Some(("ADRO".to_string(), Interval::Minute5, date))
        );
    }
}
