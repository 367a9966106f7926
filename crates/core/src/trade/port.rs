use super::entity::{Alert, HoldingDetail, NewAlert, PortfolioId, PortfolioSummary, TradeFill, TradeRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// # Summary
/// 交易执行环节中可能发生的错误。
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("组合不存在: {0}")]
    PortfolioNotFound(String),
    #[error("可用资金不足. 需要: {required}, 实际: {actual}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        actual: rust_decimal::Decimal,
    },
    #[error("持仓不足. 需要: {required}, 实际: {actual}")]
    InsufficientHoldings {
        required: rust_decimal::Decimal,
        actual: rust_decimal::Decimal,
    },
    #[error("标的暂无报价: {0}")]
    PriceUnavailable(String),
    #[error("无效的交易数量: {0}")]
    InvalidQuantity(String),
    #[error("提醒未找到: {0}")]
    AlertNotFound(String),
    #[error("成交通道错误: {0}")]
    BrokerIntegrationError(String),
    #[error("内部系统错误: {0}")]
    InternalError(String),
}

/// # Summary
/// 交易提交端口，组合状态唯一的写入口。
///
/// # Invariants
/// - 必须按 `client_order_id` 幂等：重复提交返回首次的成交回报。
#[async_trait]
pub trait TradeSubmitter: Send + Sync {
    /// # Summary
    /// 按市价提交一笔交易。
    ///
    /// # Returns
    /// * `Ok(TradeFill)` - 成交回报，含实际成交价。
    /// * `Err(TradeError)` - 资金/持仓不足、无报价或通道失败。
    async fn submit(&self, request: TradeRequest) -> Result<TradeFill, TradeError>;

    /// 成交额上收取的佣金费率，预算分配按含佣金的成本扣减现金
    fn commission_rate(&self) -> rust_decimal::Decimal {
        rust_decimal::Decimal::ZERO
    }
}

/// # Summary
/// 闭市期间的条件提醒队列。
#[async_trait]
pub trait AlertQueue: Send + Sync {
    async fn create(&self, alert: NewAlert) -> Result<Alert, TradeError>;

    /// 列出组合下全部 `Active` 状态的提醒，用于重复检查
    async fn list_active(&self, portfolio_id: &PortfolioId) -> Result<Vec<Alert>, TradeError>;

    async fn cancel(&self, alert_id: &str) -> Result<(), TradeError>;
}

/// # Summary
/// 组合只读视图与复评时间戳写入。
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn get_summary(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSummary, TradeError>;

    async fn get_holdings_detailed(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<HoldingDetail>, TradeError>;

    /// 记录某持仓最近一次通过复评的时间
    async fn stamp_evaluated(
        &self,
        portfolio_id: &PortfolioId,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<(), TradeError>;
}

/// 交易时段判断
pub trait MarketCalendar: Send + Sync {
    fn is_open(&self, at: DateTime<Utc>) -> bool;
}
