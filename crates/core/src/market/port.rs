use crate::common::{Interval, Ticker};
use crate::market::entity::{Candle, Window};
use crate::market::error::MarketError;
use async_trait::async_trait;
use chrono::NaiveDate;

/// # Summary
/// 按交易日提供 K 线的数据源接口（原始数据源）。
///
/// # Invariants
/// - 返回的 K 线已在接入边界完成字段归一化，下游组件不再区分输入格式。
/// - 请求的日期不存在数据时必须返回 `MarketError::MissingSource`，而不是空列表。
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// # Summary
    /// 加载特定证券某一交易日、某一周期的全部 K 线。
    ///
    /// # Logic
    /// 1. 定位 (ticker, date, interval) 对应的数据。
    /// 2. 解析并归一化为 `Candle`。
    ///
    /// # Arguments
    /// * `ticker`: 证券身份。
    /// * `date`: 交易日。
    /// * `interval`: 数据周期。
    ///
    /// # Returns
    /// 成功返回 K 线列表，缺失返回 `MissingSource`。
    async fn load_day(
        &self,
        ticker: &Ticker,
        date: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<Candle>, MarketError>;

    /// # Summary
    /// 列出该证券在数据源中存在的周期。
    ///
    /// # Returns
    /// 周期列表，顺序不作保证。
    async fn available_intervals(&self, ticker: &Ticker) -> Result<Vec<Interval>, MarketError>;
}

/// # Summary
/// 批量下载提供者接口，一次只抓取一个日期窗口。
///
/// # Invariants
/// - 每个周期的最大窗口由 `ProviderLimits` 配置给出，调用方在请求前负责校验。
#[async_trait]
pub trait BatchProvider: Send + Sync {
    /// # Summary
    /// 抓取单个窗口内的 K 线。
    ///
    /// # Arguments
    /// * `ticker`: 证券身份。
    /// * `interval`: 数据周期。
    /// * `window`: 左闭右开的日期窗口。
    ///
    /// # Returns
    /// 成功返回窗口内的 K 线 (顺序不作保证)。
    async fn fetch_window(
        &self,
        ticker: &Ticker,
        interval: Interval,
        window: &Window,
    ) -> Result<Vec<Candle>, MarketError>;
}
