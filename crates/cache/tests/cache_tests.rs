use rewind_cache::mem::MemCache;
use rewind_core::cache::port::{Cache, CacheExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct HistoryEntry {
    anchor: String,
    closes: Vec<f64>,
}

#[tokio::test]
async fn test_mem_cache_raw_ops() {
    let cache = MemCache::new();
    let key = "raw_key";
    let value = vec![1, 2, 3, 4];

    // 测试存取
    cache.set_raw(key, value.clone()).await.unwrap();
    let result = cache.get_raw(key).await.unwrap().unwrap();
    assert_eq!(result, value);

    // 测试删除
    cache.del(key).await.unwrap();
    assert!(cache.get_raw(key).await.unwrap().is_none());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_mem_cache_typed_ops() {
    let cache = MemCache::new();
    let entry = HistoryEntry {
        anchor: "2025-01-06".to_string(),
        closes: vec![100.0, 101.5],
    };

    cache.set("warmup:BBCA:1m", &entry).await.unwrap();
    let result: HistoryEntry = cache.get("warmup:BBCA:1m").await.unwrap().unwrap();
    assert_eq!(result, entry);

    // 类型不匹配时返回反序列化错误而不是 panic
    let mismatched = cache.get::<Vec<u32>>("warmup:BBCA:1m").await;
    assert!(mismatched.is_err());
}

#[tokio::test]
async fn test_mem_cache_evicts_oldest_when_full() {
    let cache = MemCache::with_capacity(2);
    cache.set_raw("a", vec![1]).await.unwrap();
    cache.set_raw("b", vec![2]).await.unwrap();
    // 覆盖写入不改变淘汰顺序
    cache.set_raw("a", vec![3]).await.unwrap();
    cache.set_raw("c", vec![4]).await.unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.get_raw("a").await.unwrap().is_none());
    assert_eq!(cache.get_raw("b").await.unwrap(), Some(vec![2]));
    assert_eq!(cache.get_raw("c").await.unwrap(), Some(vec![4]));
}

#[tokio::test]
async fn test_mem_cache_clear() {
    let cache = MemCache::with_capacity(4);
    cache.set_raw("a", vec![1]).await.unwrap();
    cache.set_raw("b", vec![2]).await.unwrap();
    cache.clear().await.unwrap();
    assert!(cache.is_empty());

    // 清空后仍可继续写入，且顺序队列已重置
    for key in ["w", "x", "y", "z"] {
        cache.set_raw(key, vec![0]).await.unwrap();
    }
    assert_eq!(cache.len(), 4);
}
