use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conclave_core::common::time::TimeProvider;
use conclave_core::market::port::MetricsStore;
use conclave_core::trade::entity::{
    HoldingDetail, PortfolioId, PortfolioSummary, TradeFill, TradeRequest, TradeSide,
};
use conclave_core::trade::port::{PortfolioStore, TradeError, TradeSubmitter};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::account::PortfolioManager;
use crate::matcher::LocalMatchEngine;

/// # Summary
/// 纸面交易服务，同时作为成交端口与组合只读端口的适配器。
///
/// # Invariants
/// - 同一 `client_order_id` 只成交一次，重复提交返回首次的成交回报。
/// - 去重检查与记账在组合写锁内完成，并发的重复提交不会双重成交。
pub struct PaperTradeService {
    portfolios: Arc<PortfolioManager>,
    matcher: LocalMatchEngine,
    metrics: Arc<dyn MetricsStore>,
    time: Arc<dyn TimeProvider>,
    fills: DashMap<String, TradeFill>,
}

impl PaperTradeService {
    pub fn new(
        portfolios: Arc<PortfolioManager>,
        matcher: LocalMatchEngine,
        metrics: Arc<dyn MetricsStore>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            portfolios,
            matcher,
            metrics,
            time,
            fills: DashMap::new(),
        }
    }

    pub fn portfolios(&self) -> &Arc<PortfolioManager> {
        &self.portfolios
    }

    /// 组合的全部成交，按成交时间排序
    pub fn fills(&self, portfolio_id: &PortfolioId) -> Vec<TradeFill> {
        let mut fills: Vec<TradeFill> = self
            .fills
            .iter()
            .filter(|kv| kv.value().portfolio_id == *portfolio_id)
            .map(|kv| kv.value().clone())
            .collect();
        fills.sort_by(|a, b| {
            a.executed_at
                .cmp(&b.executed_at)
                .then_with(|| a.client_order_id.cmp(&b.client_order_id))
        });
        fills
    }

    async fn price_of(&self, symbol: &str) -> Option<Decimal> {
        match self.metrics.price(symbol).await {
            Ok(price) => price.filter(|p| *p > Decimal::ZERO),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "price lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl TradeSubmitter for PaperTradeService {
    /// # Logic
    /// 1. 校验数量为正整数。
    /// 2. 取得组合写锁后检查 `client_order_id` 是否已成交，已成交直接返回原回报。
    /// 3. 以当前价格撮合，按方向记账；资金或持仓不足时拒绝且不改变组合。
    async fn submit(&self, request: TradeRequest) -> Result<TradeFill, TradeError> {
        if request.quantity <= Decimal::ZERO || request.quantity.fract() != Decimal::ZERO {
            return Err(TradeError::InvalidQuantity(request.quantity.to_string()));
        }
        let lock = self.portfolios.get(&request.portfolio_id)?;
        let mut state = lock.write().await;

        if let Some(existing) = self.fills.get(&request.client_order_id) {
            tracing::info!(client_order_id = %request.client_order_id, "duplicate submission, returning original fill");
            return Ok(existing.value().clone());
        }

        let price = self
            .price_of(&request.symbol)
            .await
            .ok_or_else(|| TradeError::PriceUnavailable(request.symbol.clone()))?;
        let fill = self.matcher.execute(&request, price, self.time.now());

        match request.side {
            TradeSide::Buy => state.apply_buy(
                &fill.symbol,
                fill.quantity,
                fill.price,
                fill.commission,
                fill.executed_at,
            )?,
            TradeSide::Sell => {
                state.apply_sell(&fill.symbol, fill.quantity, fill.price, fill.commission)?
            }
        }

        tracing::info!(
            portfolio = %fill.portfolio_id,
            symbol = %fill.symbol,
            side = %fill.side,
            quantity = %fill.quantity,
            price = %fill.price,
            "paper trade filled"
        );
        self.fills.insert(fill.client_order_id.clone(), fill.clone());
        Ok(fill)
    }

    fn commission_rate(&self) -> Decimal {
        self.matcher.commission_rate()
    }
}

#[async_trait]
impl PortfolioStore for PaperTradeService {
    async fn get_summary(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSummary, TradeError> {
        let details = self.get_holdings_detailed(portfolio_id).await?;
        let lock = self.portfolios.get(portfolio_id)?;
        let cash = lock.read().await.cash;
        let holdings: BTreeMap<String, Decimal> = details
            .iter()
            .map(|d| (d.symbol.clone(), d.quantity))
            .collect();
        let total_value = cash + details.iter().map(|d| d.current_value).sum::<Decimal>();
        Ok(PortfolioSummary {
            portfolio_id: portfolio_id.clone(),
            cash,
            holdings,
            total_value,
        })
    }

    /// # Logic
    /// 先在读锁内复制持仓，再在锁外逐个查询价格，避免持锁等待行情。
    async fn get_holdings_detailed(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<HoldingDetail>, TradeError> {
        let lock = self.portfolios.get(portfolio_id)?;
        let holdings: Vec<(String, crate::account::Holding)> = {
            let state = lock.read().await;
            state
                .holdings
                .iter()
                .filter(|(_, h)| h.quantity > Decimal::ZERO)
                .map(|(s, h)| (s.clone(), h.clone()))
                .collect()
        };

        let mut details = Vec::with_capacity(holdings.len());
        for (symbol, holding) in holdings {
            let price = self.price_of(&symbol).await;
            details.push(holding.detail(&symbol, price));
        }
        Ok(details)
    }

    async fn stamp_evaluated(
        &self,
        portfolio_id: &PortfolioId,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<(), TradeError> {
        let lock = self.portfolios.get(portfolio_id)?;
        let mut state = lock.write().await;
        if let Some(holding) = state.holdings.get_mut(symbol) {
            holding.last_evaluated_at = Some(at);
        }
        Ok(())
    }
}
