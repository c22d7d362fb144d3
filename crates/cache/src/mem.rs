use async_trait::async_trait;
use dashmap::DashMap;
use rewind_core::cache::error::CacheError;
use rewind_core::cache::port::Cache;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// # Summary
/// 基于 DashMap 的内存缓存实现，带容量上限。
///
/// # Invariants
/// - 所有读写均通过并发哈希表 `DashMap` 执行，保证多线程安全。
/// - 条目数超过 `capacity` 时按首次写入顺序淘汰最旧的键 (FIFO)。
/// - 覆盖写入不改变键的淘汰顺序。
pub struct MemCache {
    // 线程安全的 KV 存储容器
    storage: DashMap<String, Vec<u8>>,
    // 键的写入顺序，用于淘汰
    order: Mutex<VecDeque<String>>,
    // 最大条目数
    capacity: usize,
}

impl MemCache {
    /// # Summary
    /// 创建一个不限容量的缓存实例。
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// # Summary
    /// 创建一个带容量上限的缓存实例。
    ///
    /// # Arguments
    /// * `capacity`: 最大条目数，0 视为 1。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }
}

impl Default for MemCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemCache {
    /// # Summary
    /// 写入原始字节数据。
    ///
    /// # Logic
    /// 1. 插入或覆盖哈希表中的值。
    /// 2. 新键追加到写入顺序队尾。
    /// 3. 超出容量时从队首依次淘汰。
    async fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let is_new = self.storage.insert(key.to_string(), value).is_none();
        if !is_new {
            return Ok(());
        }

        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.push_back(key.to_string());
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                debug!("MemCache evicting {}", evicted);
                self.storage.remove(&evicted);
            }
        }
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.storage.get(key).map(|v| v.value().clone()))
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        if self.storage.remove(key).is_some() {
            let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
            order.retain(|k| k != key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.clear();
        self.storage.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.storage.len()
    }
}
