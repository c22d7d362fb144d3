use rewind_core::common::Interval;
use rewind_core::config::ResampleConfig;
use rewind_core::market::entity::{Candle, DataIssue, IntegrityReport, ResampledCandle};
use rewind_core::market::error::MarketError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// # Summary
/// 周期切换按钮的可用状态，供界面展示禁用原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchAvailability {
    pub enabled: bool,
    // 禁用时的可读原因
    pub reason: Option<String>,
}

/// # Summary
/// 周期聚合器：把细粒度 K 线聚合为任意整数倍的粗粒度 K 线。
///
/// # Invariants
/// - 只聚合到整数倍周期，绝不近似、绝不降采样。
/// - 输入序列不被修改，所有结果都是新分配的序列。
#[derive(Debug, Clone, Default)]
pub struct Resampler {
    config: ResampleConfig,
}

// 正在累积的桶
struct Bucket {
    start: i64,
    candle: Candle,
    count: usize,
    last_ts: i64,
}

impl Bucket {
    fn open(start: i64, first: &Candle) -> Self {
        Self {
            start,
            candle: *first,
            count: 1,
            last_ts: first.timestamp,
        }
    }

    fn absorb(&mut self, next: &Candle) {
        self.candle.high = self.candle.high.max(next.high);
        self.candle.low = self.candle.low.min(next.low);
        self.candle.close = next.close;
        self.candle.volume += next.volume;
        self.count += 1;
        self.last_ts = next.timestamp;
    }

    fn finish(self, expected: usize) -> ResampledCandle {
        if let Some(detail) = self.candle.ohlc_violation() {
            warn!(
                "Resampled candle at {} violates OHLC invariants: {}",
                self.candle.timestamp, detail
            );
        }
        ResampledCandle {
            candle: self.candle,
            bucket_start: self.start,
            is_partial: self.count < expected,
            candle_count: self.count,
            expected_count: expected,
        }
    }
}

/// 时间戳所在的网格桶起点
pub fn bucket_start(timestamp: i64, target_ms: i64) -> i64 {
    timestamp.div_euclid(target_ms) * target_ms
}

impl Resampler {
    pub fn new(config: ResampleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    /// 源周期能否聚合为目标周期 (静态查表)
    pub fn is_compatible(source: Interval, target: Interval) -> bool {
        source.can_resample_into(target)
    }

    /// # Summary
    /// 判断能否从 `source` 切换显示为 `target`，并给出具体原因。
    ///
    /// # Logic
    /// 1. 周期不兼容时返回 `IncompatibleInterval`。
    /// 2. 完整目标桶数 `len / ratio` 不足 `min_buckets` 时返回 `InsufficientData`。
    /// 3. 实际时间跨度 `last - first + source_ms` 不足 `min_buckets × target_ms` 时
    ///    同样返回 `InsufficientData`，即使原始数量足够。
    ///
    /// # Arguments
    /// * `series`: 按时间升序的源 K 线。
    /// * `source`: 源周期。
    /// * `target`: 目标周期。
    ///
    /// # Returns
    /// 可以切换返回 `Ok(())`。
    pub fn check_switch(
        &self,
        series: &[Candle],
        source: Interval,
        target: Interval,
    ) -> Result<(), MarketError> {
        let ratio = source
            .ratio_to(target)
            .ok_or(MarketError::IncompatibleInterval {
                from: source,
                to: target,
            })?;

        let buckets = series.len() / ratio.max(1);
        let span_ms = match (series.first(), series.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp + source.duration_ms(),
            _ => 0,
        };
        let min_buckets = i64::try_from(self.config.min_buckets).unwrap_or(i64::MAX);
        let required_span_ms = min_buckets.saturating_mul(target.duration_ms());

        if buckets < self.config.min_buckets || span_ms < required_span_ms {
            return Err(MarketError::InsufficientData {
                target,
                buckets,
                required_buckets: self.config.min_buckets,
                span_ms,
                required_span_ms,
            });
        }
        Ok(())
    }

    pub fn can_switch(&self, series: &[Candle], source: Interval, target: Interval) -> bool {
        self.check_switch(series, source, target).is_ok()
    }

    /// # Summary
    /// 将切换判定转换为界面可直接使用的 `{enabled, reason}`。
    pub fn switch_availability(
        &self,
        series: &[Candle],
        source: Interval,
        target: Interval,
    ) -> SwitchAvailability {
        match self.check_switch(series, source, target) {
            Ok(()) => SwitchAvailability {
                enabled: true,
                reason: None,
            },
            Err(MarketError::IncompatibleInterval { from, to }) => SwitchAvailability {
                enabled: false,
                reason: Some(format!("{to} is not a whole multiple of {from}")),
            },
            Err(MarketError::InsufficientData {
                target,
                buckets,
                required_buckets,
                ..
            }) => SwitchAvailability {
                enabled: false,
                reason: Some(format!(
                    "Not enough data for {target}: need {required_buckets} full candles, have {buckets}"
                )),
            },
            Err(e) => SwitchAvailability {
                enabled: false,
                reason: Some(e.to_string()),
            },
        }
    }

    /// # Summary
    /// 将源序列聚合为目标周期。
    ///
    /// # Logic
    /// 1. 空输入返回空序列；周期不兼容返回错误。
    /// 2. 目标与源相同时原样复制，每根视为完整桶。
    /// 3. 顺序遍历：网格桶起点变化，或相邻源 K 线间隔超过 `gap_factor × target_ms`，
    ///    则结束当前桶并开启新桶。
    /// 4. 末尾未满的桶同样输出，并标记为 partial。
    ///
    /// # Arguments
    /// * `series`: 按时间升序的源 K 线。
    /// * `source`: 源周期。
    /// * `target`: 目标周期。
    ///
    /// # Returns
    /// 带桶信息的聚合结果。
    pub fn resample(
        &self,
        series: &[Candle],
        source: Interval,
        target: Interval,
    ) -> Result<Vec<ResampledCandle>, MarketError> {
        let expected = source
            .ratio_to(target)
            .ok_or(MarketError::IncompatibleInterval {
                from: source,
                to: target,
            })?;
        let target_ms = target.duration_ms();

        if source == target {
            return Ok(series
                .iter()
                .map(|c| ResampledCandle {
                    candle: *c,
                    bucket_start: bucket_start(c.timestamp, target_ms),
                    is_partial: false,
                    candle_count: 1,
                    expected_count: 1,
                })
                .collect());
        }

        let gap_threshold = self.config.gap_factor * target_ms as f64;
        let mut output = Vec::with_capacity(series.len() / expected + 1);
        let mut current: Option<Bucket> = None;

        for candle in series {
            let start = bucket_start(candle.timestamp, target_ms);
            match current.as_mut() {
                Some(bucket)
                    if bucket.start == start
                        && ((candle.timestamp - bucket.last_ts) as f64) <= gap_threshold =>
                {
                    bucket.absorb(candle);
                }
                _ => {
                    if let Some(done) = current.take() {
                        output.push(done.finish(expected));
                    }
                    current = Some(Bucket::open(start, candle));
                }
            }
        }
        if let Some(done) = current {
            output.push(done.finish(expected));
        }

        debug!(
            "Resampled {} {} candles into {} {} candles",
            series.len(),
            source,
            output.len(),
            target
        );
        Ok(output)
    }

    /// 聚合并去掉桶信息，只保留 K 线
    pub fn resample_candles(
        &self,
        series: &[Candle],
        source: Interval,
        target: Interval,
    ) -> Result<Vec<Candle>, MarketError> {
        Ok(self
            .resample(series, source, target)?
            .into_iter()
            .map(|r| r.candle)
            .collect())
    }

    /// # Summary
    /// 校验聚合结果，只报告不抛错。
    ///
    /// # Logic
    /// 1. 聚合后数量不得多于原始数量。
    /// 2. 每个桶起点必须对齐网格，且 K 线时间戳落在所属桶内。
    /// 3. 每根 K 线满足 OHLC 不变量。
    ///
    /// # Returns
    /// 无任何问题时 `valid == true`。
    pub fn validate_resample(
        original: &[Candle],
        resampled: &[ResampledCandle],
        target: Interval,
    ) -> IntegrityReport {
        let target_ms = target.duration_ms();
        let mut issues = Vec::new();

        if resampled.len() > original.len() {
            issues.push(DataIssue::LengthExceeded {
                original: original.len(),
                resampled: resampled.len(),
            });
        }

        for r in resampled {
            let ts = r.candle.timestamp;
            let aligned = r.bucket_start.rem_euclid(target_ms) == 0;
            let inside = ts >= r.bucket_start && ts < r.bucket_start + target_ms;
            if !aligned || !inside {
                issues.push(DataIssue::Misaligned {
                    timestamp: ts,
                    bucket_start: r.bucket_start,
                });
            }
            if let Some(detail) = r.candle.ohlc_violation() {
                issues.push(DataIssue::OhlcViolation {
                    timestamp: ts,
                    detail,
                });
            }
        }

        IntegrityReport {
            valid: issues.is_empty(),
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::testing::{candle, series};

    const MIN: i64 = 60_000;

    fn resampler() -> Resampler {
        Resampler::new(ResampleConfig::default())
    }

    fn five_minutes() -> Vec<Candle> {
        let base = 1_736_132_400_000; // 2025-01-06 03:00:00 UTC，5 分钟网格对齐
        vec![
            Candle::new(base, 100.0, 105.0, 95.0, 102.0, 1000.0),
            Candle::new(base + MIN, 102.0, 108.0, 100.0, 106.0, 1500.0),
            Candle::new(base + 2 * MIN, 106.0, 112.0, 104.0, 110.0, 1200.0),
            Candle::new(base + 3 * MIN, 110.0, 115.0, 108.0, 112.0, 1300.0),
            Candle::new(base + 4 * MIN, 112.0, 118.0, 110.0, 115.0, 1100.0),
        ]
    }

    #[test]
    fn test_five_one_minute_candles_make_one_five_minute_candle() {
        let input = five_minutes();
        let out = resampler()
            .resample(&input, Interval::Minute1, Interval::Minute5)
            .unwrap();
        assert_eq!(out.len(), 1);
        let r = out[0];
        assert_eq!(
            r.candle,
            Candle::new(input[0].timestamp, 100.0, 118.0, 95.0, 115.0, 6100.0)
        );
        assert!(!r.is_partial);
        assert_eq!(r.candle_count, 5);
        assert_eq!(r.expected_count, 5);
    }

    #[test]
    fn test_identity_resample_is_copy() {
        let input = series(0, MIN, 30);
        let out = resampler()
            .resample_candles(&input, Interval::Minute1, Interval::Minute1)
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_empty_input_and_incompatible_target() {
        let r = resampler();
        assert!(r.resample(&[], Interval::Minute1, Interval::Minute5).unwrap().is_empty());
        assert_eq!(
            r.resample(&series(0, 2 * MIN, 5), Interval::Minute2, Interval::Minute5),
            Err(MarketError::IncompatibleInterval {
                from: Interval::Minute2,
                to: Interval::Minute5
            })
        );
        assert!(Resampler::is_compatible(Interval::Minute2, Interval::Minute30));
        assert!(!Resampler::is_compatible(Interval::Minute5, Interval::Minute1));
    }

    #[test]
    fn test_trailing_partial_bucket_kept() {
        let input = series(0, MIN, 12);
        let out = resampler()
            .resample(&input, Interval::Minute1, Interval::Minute5)
            .unwrap();
        assert_eq!(out.len(), 3);
        assert!(!out[0].is_partial && !out[1].is_partial);
        assert!(out[2].is_partial);
        assert_eq!(out[2].candle_count, 2);
    }

    #[test]
    fn test_volume_conserved_and_ohlc_bounds_hold() {
        let input = series(0, MIN, 60);
        let out = resampler()
            .resample(&input, Interval::Minute1, Interval::Minute15)
            .unwrap();
        let total_in: f64 = input.iter().map(|c| c.volume).sum();
        let total_out: f64 = out.iter().map(|r| r.candle.volume).sum();
        assert!((total_in - total_out).abs() < 1e-6);
        for r in &out {
            let c = r.candle;
            assert!(c.high >= c.open && c.high >= c.close);
            assert!(c.low <= c.open && c.low <= c.close);
        }
        assert!(Resampler::validate_resample(&input, &out, Interval::Minute15).valid);
    }

    #[test]
    fn test_misaligned_first_candle_starts_partial_bucket() {
        // 首根位于 09:03，所在 5 分钟桶只有 2 根
        let input = series(3 * MIN, MIN, 7);
        let out = resampler()
            .resample(&input, Interval::Minute1, Interval::Minute5)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].bucket_start, 0);
        assert_eq!(out[0].candle.timestamp, 3 * MIN);
        assert_eq!(out[0].candle_count, 2);
        assert_eq!(out[1].bucket_start, 5 * MIN);
        assert_eq!(out[1].candle_count, 5);
    }

    #[test]
    fn test_can_switch_requires_bucket_count() {
        let r = resampler();
        assert!(!r.can_switch(&series(0, MIN, 49), Interval::Minute1, Interval::Minute5));
        assert!(r.can_switch(&series(0, MIN, 50), Interval::Minute1, Interval::Minute5));
    }

    #[test]
    fn test_can_switch_rejects_short_span() {
        // 数量足够 (80 根)，但以 30 秒间隔排列，实际跨度只有 40.5 分钟
        let input = series(0, MIN / 2, 80);
        let r = resampler();
        let err = r
            .check_switch(&input, Interval::Minute1, Interval::Minute5)
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientData { buckets: 16, .. }));
        assert!(!r.can_switch(&input, Interval::Minute1, Interval::Minute5));
    }

    #[test]
    fn test_switch_availability_reasons() {
        let r = resampler();
        let incompatible =
            r.switch_availability(&series(0, 2 * MIN, 100), Interval::Minute2, Interval::Minute5);
        assert!(!incompatible.enabled);
        assert!(incompatible.reason.unwrap().contains("multiple"));

        let insufficient =
            r.switch_availability(&series(0, MIN, 10), Interval::Minute1, Interval::Hour1);
        assert!(!insufficient.enabled);
        assert!(insufficient.reason.unwrap().contains("Not enough data"));

        let ok = r.switch_availability(&series(0, MIN, 60), Interval::Minute1, Interval::Minute5);
        assert_eq!(ok, SwitchAvailability { enabled: true, reason: None });
    }

    #[test]
    fn test_validate_flags_bad_output() {
        let input = five_minutes();
        let bad = vec![ResampledCandle {
            candle: Candle::new(7 * MIN, 10.0, 9.0, 8.0, 9.5, 1.0),
            bucket_start: 3 * MIN,
            is_partial: false,
            candle_count: 5,
            expected_count: 5,
        }];
        let report = Resampler::validate_resample(&input, &bad, Interval::Minute5);
        assert!(!report.valid);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, DataIssue::Misaligned { .. })));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, DataIssue::OhlcViolation { .. })));
    }

    #[test]
    fn test_gap_never_merges_across_sessions() {
        // 上午最后一根与下午第一根相隔两小时，1 小时桶不能跨越
        let input = vec![
            candle(0, 1.0, 2.0, 10.0),
            candle(30 * MIN, 2.0, 3.0, 10.0),
            candle(150 * MIN, 3.0, 4.0, 10.0),
        ];
        let out = resampler()
            .resample(&input, Interval::Minute30, Interval::Hour1)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].candle_count, 2);
        assert_eq!(out[1].candle.timestamp, 150 * MIN);
    }
}
