use chrono::{DateTime, Utc};
use conclave_core::trade::entity::{TradeFill, TradeRequest};
use rust_decimal::Decimal;

/// # Summary
/// 纸面交易的本地撮合引擎。
///
/// # Invariants
/// - 市价单以传入的当前价格一次性全部成交。
/// - 佣金为成交额乘以固定费率，买卖双边收取。
pub struct LocalMatchEngine {
    commission_rate: Decimal,
}

impl Default for LocalMatchEngine {
    fn default() -> Self {
        Self::new(Decimal::ZERO)
    }
}

impl LocalMatchEngine {
    pub fn new(commission_rate: Decimal) -> Self {
        Self { commission_rate }
    }

    pub fn commission_rate(&self) -> Decimal {
        self.commission_rate
    }

    pub fn commission(&self, notional: Decimal) -> Decimal {
        (notional * self.commission_rate).round_dp(4)
    }

    /// 生成成交回报；成交编号由 `client_order_id` 派生，保证同一意图编号稳定
    pub fn execute(&self, request: &TradeRequest, price: Decimal, at: DateTime<Utc>) -> TradeFill {
        let notional = price * request.quantity;
        TradeFill {
            trade_id: format!("T-{}", request.client_order_id),
            client_order_id: request.client_order_id.clone(),
            portfolio_id: request.portfolio_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price,
            commission: self.commission(notional),
            executed_at: at,
        }
    }
}
