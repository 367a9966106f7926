use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// # Summary
/// 组合的唯一标识。策略只与组合绑定，不关心背后的成交通道。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct PortfolioId(pub String);

impl std::fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 交易方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// # Summary
/// 一笔市价交易意图。
///
/// # Invariants
/// - `client_order_id` 由编排器按 (运行, 标的, 方向) 生成，成交端据此去重，
///   同一意图重复提交只会成交一次。
/// - `quantity` 为正整数股数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub client_order_id: String,
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
}

/// 成交回报
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub trade_id: String,
    pub client_order_id: String,
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    /// 实际成交价格
    pub price: Decimal,
    pub commission: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// # Summary
/// 组合概况：现金、持仓数量与总市值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub portfolio_id: PortfolioId,
    pub cash: Decimal,
    pub holdings: BTreeMap<String, Decimal>,
    /// 现金 + 持仓市值
    pub total_value: Decimal,
}

/// # Summary
/// 带成本信息的持仓明细，供止盈止损与持仓复评使用。
///
/// # Invariants
/// - `cost_basis` 为该持仓的总成本 (数量 × 均价)，而非单价。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingDetail {
    pub symbol: String,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub current_value: Decimal,
    /// 首次建仓时间，未知时为空
    pub acquired_at: Option<DateTime<Utc>>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

impl HoldingDetail {
    /// # Summary
    /// 浮动盈亏百分比。
    ///
    /// # Logic
    /// `(current_value - cost_basis) / cost_basis * 100`，成本非正时返回 0。
    pub fn gain_pct(&self) -> Decimal {
        if self.cost_basis <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.current_value - self.cost_basis) / self.cost_basis * Decimal::ONE_HUNDRED
    }
}

/// 闭市时排队的条件提醒动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    MarketBuy,
    MarketSell,
}

impl From<TradeSide> for AlertAction {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => AlertAction::MarketBuy,
            TradeSide::Sell => AlertAction::MarketSell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Triggered,
    Cancelled,
}

/// 待创建的条件提醒
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    pub action: AlertAction,
    pub quantity: Decimal,
    pub decision_id: Option<String>,
    pub reason: String,
}

/// # Summary
/// 闭市期间排队、等待开市后执行的交易提醒。
///
/// # Invariants
/// - 同一 (组合, 标的, 动作) 在任意时刻至多存在一条 `Active` 提醒，由编排器在创建前检查。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    pub action: AlertAction,
    pub quantity: Decimal,
    pub status: AlertStatus,
    pub decision_id: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
