use chrono::{DateTime, Utc};
use conclave_core::trade::entity::{HoldingDetail, PortfolioId};
use conclave_core::trade::port::TradeError;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// # Summary
/// 单个标的的持仓记录。
///
/// # Invariants
/// - `cost_basis` 为总成本，部分卖出时按数量比例扣减。
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub acquired_at: Option<DateTime<Utc>>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

impl Holding {
    /// 按给定价格估值的持仓明细；无价格时以成本估值
    pub fn detail(&self, symbol: &str, price: Option<Decimal>) -> HoldingDetail {
        let current_value = price.map_or(self.cost_basis, |p| p * self.quantity);
        HoldingDetail {
            symbol: symbol.to_string(),
            quantity: self.quantity,
            cost_basis: self.cost_basis,
            current_value,
            acquired_at: self.acquired_at,
            last_evaluated_at: self.last_evaluated_at,
        }
    }
}

/// # Summary
/// 纸面组合的内部状态，由 `RwLock` 保护。
pub struct PortfolioState {
    pub portfolio_id: PortfolioId,
    pub cash: Decimal,
    pub holdings: BTreeMap<String, Holding>,
}

impl PortfolioState {
    pub fn new(portfolio_id: PortfolioId, initial_cash: Decimal) -> Self {
        Self {
            portfolio_id,
            cash: initial_cash,
            holdings: BTreeMap::new(),
        }
    }

    /// # Logic
    /// 买入扣减现金 (含佣金)，累加数量与总成本。首次建仓记录建仓时间。
    pub fn apply_buy(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        commission: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), TradeError> {
        let required = quantity * price + commission;
        if self.cash < required {
            return Err(TradeError::InsufficientFunds {
                required,
                actual: self.cash,
            });
        }
        self.cash -= required;
        let holding = self.holdings.entry(symbol.to_string()).or_insert_with(|| Holding {
            quantity: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            acquired_at: Some(at),
            last_evaluated_at: None,
        });
        holding.quantity += quantity;
        holding.cost_basis += quantity * price + commission;
        Ok(())
    }

    /// # Logic
    /// 卖出增加现金 (扣除佣金)，按比例扣减总成本；清仓后移除记录。
    pub fn apply_sell(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        commission: Decimal,
    ) -> Result<(), TradeError> {
        let held = self.holdings.get(symbol).map_or(Decimal::ZERO, |h| h.quantity);
        if held < quantity {
            return Err(TradeError::InsufficientHoldings {
                required: quantity,
                actual: held,
            });
        }
        if let Some(holding) = self.holdings.get_mut(symbol) {
            let released = holding.cost_basis * quantity / holding.quantity;
            holding.quantity -= quantity;
            holding.cost_basis -= released;
            if holding.quantity.is_zero() {
                self.holdings.remove(symbol);
            }
        }
        self.cash += quantity * price - commission;
        Ok(())
    }
}

/// # Summary
/// 纸面组合管理器，负责所有组合的并发访问。
///
/// # Invariants
/// - DashMap 做组合级分段，单个组合内部再用 RwLock 保证读写一致。
pub struct PortfolioManager {
    portfolios: dashmap::DashMap<PortfolioId, Arc<RwLock<PortfolioState>>>,
}

impl Default for PortfolioManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioManager {
    pub fn new() -> Self {
        Self {
            portfolios: dashmap::DashMap::new(),
        }
    }

    /// 组合不存在时以初始资金创建
    pub fn ensure_portfolio(&self, id: PortfolioId, initial_cash: Decimal) {
        self.portfolios
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(PortfolioState::new(id, initial_cash))));
    }

    pub fn get(&self, id: &PortfolioId) -> Result<Arc<RwLock<PortfolioState>>, TradeError> {
        self.portfolios
            .get(id)
            .map(|kv| kv.value().clone())
            .ok_or_else(|| TradeError::PortfolioNotFound(id.0.clone()))
    }

    /// # Summary
    /// 直接写入一笔已有持仓，用于从快照恢复组合。
    pub async fn seed_holding(
        &self,
        id: &PortfolioId,
        symbol: &str,
        holding: Holding,
    ) -> Result<(), TradeError> {
        let lock = self.get(id)?;
        lock.write().await.holdings.insert(symbol.to_string(), holding);
        Ok(())
    }
}
