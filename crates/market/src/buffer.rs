use serde::{Deserialize, Serialize};

/// # Summary
/// 固定容量的滚动环形缓冲区，用于保存最近 N 根预热 K 线。
///
/// # Invariants
/// - 内存空间在初始化时一次性分配，后续不再扩容。
/// - 始终保持最近 `capacity` 个元素，`to_vec` 按插入顺序返回。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RollingBuffer<T> {
    // 内部存储容器
    data: Vec<T>,
    // 最大容量
    capacity: usize,
    // 已满时下一次覆盖的位置，也是最旧元素所在位置
    cursor: usize,
}

impl<T: Clone> RollingBuffer<T> {
    /// # Summary
    /// 创建一个新的滚动缓冲区。
    ///
    /// # Arguments
    /// * `capacity`: 固定容量上限，0 视为 1。
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// # Summary
    /// 由序列构造缓冲区，只保留末尾 `capacity` 个元素。
    pub fn from_tail(items: &[T], capacity: usize) -> Self {
        let mut buffer = Self::new(capacity);
        buffer.extend(items);
        buffer
    }

    /// # Summary
    /// 推送新元素。
    ///
    /// # Logic
    /// 未满时直接追加；已满时覆盖 cursor 处最旧的元素，并递增 (取模) cursor。
    pub fn push(&mut self, item: T) {
        if self.data.len() < self.capacity {
            self.data.push(item);
        } else {
            self.data[self.cursor] = item;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
    }

    pub fn extend(&mut self, items: &[T]) {
        let skip = items.len().saturating_sub(self.capacity);
        for item in &items[skip..] {
            self.push(item.clone());
        }
    }

    /// # Summary
    /// 按插入顺序返回全部元素。
    ///
    /// # Logic
    /// 已满时以 cursor 为界切割并重组两段，保证结果有序。
    pub fn to_vec(&self) -> Vec<T> {
        if self.data.len() < self.capacity {
            self.data.clone()
        } else {
            let mut result = Vec::with_capacity(self.capacity);
            result.extend(self.data[self.cursor..].iter().cloned());
            result.extend(self.data[..self.cursor].iter().cloned());
            result
        }
    }

    /// 按插入顺序返回最近 `count` 个元素
    pub fn latest(&self, count: usize) -> Vec<T> {
        let all = self.to_vec();
        let skip = all.len().saturating_sub(count);
        all[skip..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_keeps_most_recent() {
        let mut buffer = RollingBuffer::new(3);
        for i in 1..=5 {
            buffer.push(i);
        }
        assert_eq!(buffer.to_vec(), vec![3, 4, 5]);
        assert_eq!(buffer.latest(1), vec![5]);
    }

    #[test]
    fn test_from_tail_and_latest() {
        let buffer = RollingBuffer::from_tail(&[1, 2, 3, 4, 5, 6, 7], 4);
        assert_eq!(buffer.to_vec(), vec![4, 5, 6, 7]);
        assert_eq!(buffer.latest(2), vec![6, 7]);
        assert_eq!(buffer.latest(10), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_empty_and_zero_capacity() {
        let mut buffer: RollingBuffer<i64> = RollingBuffer::new(0);
        assert!(buffer.to_vec().is_empty());
        assert!(buffer.latest(3).is_empty());
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.to_vec(), vec![2]);
    }

    #[test]
    fn test_wrapped_buffer_survives_json() {
        let mut buffer = RollingBuffer::new(2);
        for i in 0..5 {
            buffer.push(i);
        }
        let json = serde_json::to_string(&buffer).unwrap();
        let restored: RollingBuffer<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to_vec(), vec![3, 4]);
    }
}
