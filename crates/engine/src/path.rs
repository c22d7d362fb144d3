use rand::{Rng, SeedableRng, rngs::StdRng};
use rewind_core::market::entity::Candle;

/// # Summary
/// 一根 K 线的合成采样路径，进入该 K 线时生成一次并缓存。
///
/// # Invariants
/// - `prices.len() == volumes.len() == num_ticks`。
/// - `prices[0] == open`，`prices[last] == close`，其余点位于 `[low, high]` 内。
/// - `volumes` 非负且总和等于 K 线成交量 (浮点误差内)。
#[derive(Debug, Clone, PartialEq)]
pub struct TickPath {
    pub prices: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl TickPath {
    pub fn generate(candle: &Candle, num_ticks: usize) -> Self {
        Self {
            prices: price_path(candle, num_ticks),
            volumes: volume_distribution(candle, num_ticks),
        }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// # Summary
/// 生成开盘到收盘之间经过两个极值的分段线性价格路径。
///
/// # Logic
/// 1. 阳线 (close >= open) 依次经过 open → low → high → close，阴线经过 open → high → low → close。
/// 2. 把 `num_ticks - 1` 个步长按各段价格距离分配 (最大商数法)，每段内线性插值。
/// 3. 最后一点强制等于 close。
///
/// # Arguments
/// * `candle`: 源 K 线。
/// * `num_ticks`: 采样点数，小于 2 时按 2 处理。
///
/// # Returns
/// 长度为 `num_ticks` 的价格序列。
pub fn price_path(candle: &Candle, num_ticks: usize) -> Vec<f64> {
    let num_ticks = num_ticks.max(2);
    let waypoints = if candle.close >= candle.open {
        [candle.open, candle.low, candle.high, candle.close]
    } else {
        [candle.open, candle.high, candle.low, candle.close]
    };
    let lengths: Vec<f64> = waypoints
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .collect();
    let steps = allocate_steps(&lengths, num_ticks - 1);

    let mut prices = Vec::with_capacity(num_ticks);
    prices.push(candle.open);
    for (segment, &count) in steps.iter().enumerate() {
        let (from, to) = (waypoints[segment], waypoints[segment + 1]);
        for j in 1..=count {
            prices.push(from + (to - from) * (j as f64 / count as f64));
        }
    }
    if let Some(last) = prices.last_mut() {
        *last = candle.close;
    }
    prices
}

// 按段长度分配步数；所有段长度为 0 时全部给最后一段
fn allocate_steps(lengths: &[f64], steps: usize) -> Vec<usize> {
    let mut allocated = vec![0usize; lengths.len()];
    if lengths.iter().all(|l| *l <= 0.0) {
        if let Some(last) = allocated.last_mut() {
            *last = steps;
        }
        return allocated;
    }
    for _ in 0..steps {
        let mut best = 0;
        let mut best_score = f64::MIN;
        for (i, length) in lengths.iter().enumerate() {
            let score = length / (allocated[i] + 1) as f64;
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        allocated[best] += 1;
    }
    allocated
}

/// # Summary
/// 把 K 线成交量分配到各采样点。
///
/// # Logic
/// 1. 以 K 线时间戳为种子生成 `[0.5, 1.5)` 的随机权重，同一根 K 线的分配始终一致。
/// 2. 前 `num_ticks - 1` 个点按权重比例分配，最后一点取剩余量 (不小于 0)。
pub fn volume_distribution(candle: &Candle, num_ticks: usize) -> Vec<f64> {
    let num_ticks = num_ticks.max(2);
    if !candle.volume.is_finite() || candle.volume <= 0.0 {
        return vec![0.0; num_ticks];
    }

    let seed = u64::from_le_bytes(candle.timestamp.to_le_bytes());
    let mut rng = StdRng::seed_from_u64(seed);
    let weights: Vec<f64> = (0..num_ticks).map(|_| rng.random_range(0.5..1.5)).collect();
    let total: f64 = weights.iter().sum();

    let mut volumes: Vec<f64> = weights[..num_ticks - 1]
        .iter()
        .map(|w| candle.volume * w / total)
        .collect();
    let assigned: f64 = volumes.iter().sum();
    volumes.push((candle.volume - assigned).max(0.0));
    volumes
}
