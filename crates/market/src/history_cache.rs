use crate::buffer::RollingBuffer;
use chrono::NaiveDate;
use dashmap::DashMap;
use rewind_core::cache::port::{Cache, CacheExt};
use rewind_core::common::{Interval, Ticker};
use rewind_core::market::entity::Candle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

// 单条缓存记录：某个锚定日期之前的预热历史
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryEntry {
    // 预热历史对应的目标交易日
    anchor: NaiveDate,
    // 构建时请求的数量；少于该数量说明回溯已到上限
    requested: usize,
    candles: RollingBuffer<Candle>,
}

/// # Summary
/// 按 (ticker, interval) 缓存预热历史，跳过重复的回溯扫描。
///
/// # Invariants
/// - 读取结果始终裁剪为调用方请求的数量。
/// - 同一键的并发加载通过 `lock` 串行化，后到者直接命中缓存。
/// - 缓存读写失败只记录告警并视为未命中。
pub struct HistoryCache {
    cache: Arc<dyn Cache>,
    // 每个键的加载锁
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl HistoryCache {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            locks: DashMap::new(),
        }
    }

    fn key(ticker: &Ticker, interval: Interval) -> String {
        format!("warmup:{}:{}", ticker.symbol, interval)
    }

    /// # Summary
    /// 获取该键的加载锁，持有期间其他加载者等待。
    pub async fn lock(&self, ticker: &Ticker, interval: Interval) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(Self::key(ticker, interval))
            .or_default()
            .clone();
        mutex.lock_owned().await
    }

    /// # Summary
    /// 读取 `anchor` 之前最近 `count` 根历史 K 线。
    ///
    /// # Logic
    /// 1. 锚定日期不一致视为未命中。
    /// 2. 已缓存数量不足 `count`，且构建时请求的数量也小于 `count` 时视为未命中。
    /// 3. 命中时返回末尾 `count` 根。
    pub async fn get(
        &self,
        ticker: &Ticker,
        interval: Interval,
        anchor: NaiveDate,
        count: usize,
    ) -> Option<Vec<Candle>> {
        let key = Self::key(ticker, interval);
        let entry = match self.cache.get::<HistoryEntry>(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("Ignoring unreadable history cache entry {}: {}", key, e);
                return None;
            }
        };

        if entry.anchor != anchor {
            return None;
        }
        let candles = entry.candles.latest(count);
        if candles.len() < count && entry.requested < count {
            return None;
        }
        debug!("History cache hit for {} ({} candles)", key, candles.len());
        Some(candles)
    }

    /// # Summary
    /// 写入预热历史，只保留末尾 `requested` 根。
    pub async fn put(
        &self,
        ticker: &Ticker,
        interval: Interval,
        anchor: NaiveDate,
        requested: usize,
        candles: &[Candle],
    ) {
        let key = Self::key(ticker, interval);
        let entry = HistoryEntry {
            anchor,
            requested,
            candles: RollingBuffer::from_tail(candles, requested),
        };
        if let Err(e) = self.cache.set(&key, &entry).await {
            warn!("Failed to store history cache entry {}: {}", key, e);
        }
    }

    pub async fn invalidate(&self, ticker: &Ticker, interval: Interval) {
        let key = Self::key(ticker, interval);
        if let Err(e) = self.cache.del(&key).await {
            warn!("Failed to invalidate history cache entry {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_cache::mem::MemCache;

    fn candles(count: i64) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle::new(i * 60_000, 1.0, 1.0, 1.0, 1.0, 1.0))
            .collect()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_get_trims_and_respects_requested_count() {
        let cache = HistoryCache::new(Arc::new(MemCache::with_capacity(4)));
        let ticker = Ticker::new("BBCA");

        // 请求 5 根，存入 8 根，只保留末尾 5 根
        cache.put(&ticker, Interval::Minute1, day(13), 5, &candles(8)).await;
        let hit = cache.get(&ticker, Interval::Minute1, day(13), 3).await.unwrap();
        let stamps: Vec<i64> = hit.iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![300_000, 360_000, 420_000]);
        assert!(cache.get(&ticker, Interval::Minute1, day(13), 6).await.is_none());
        assert!(cache.get(&ticker, Interval::Minute1, day(14), 3).await.is_none());

        // 回溯到上限时历史不足请求量，仍视为命中
        cache.put(&ticker, Interval::Minute5, day(13), 10, &candles(4)).await;
        let short = cache.get(&ticker, Interval::Minute5, day(13), 10).await.unwrap();
        assert_eq!(short.len(), 4);
        assert!(cache.get(&ticker, Interval::Minute5, day(13), 11).await.is_none());
    }
}
