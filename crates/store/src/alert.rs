use async_trait::async_trait;
use conclave_core::common::time::TimeProvider;
use conclave_core::trade::entity::{Alert, AlertStatus, NewAlert, PortfolioId};
use conclave_core::trade::port::{AlertQueue, TradeError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// # Summary
/// 基于内存的提醒队列，作为 `AlertQueue` 的适配器。
///
/// # Invariants
/// - 提醒不会被物理删除，取消只改变状态。
/// - 本身不做去重，重复检查由调用方基于 `list_active` 完成。
pub struct MemoryAlertQueue {
    alerts: Arc<RwLock<HashMap<String, Alert>>>,
    time: Arc<dyn TimeProvider>,
}

impl MemoryAlertQueue {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            alerts: Arc::new(RwLock::new(HashMap::new())),
            time,
        }
    }

    /// 组合下全部提醒 (含已取消)，按创建时间排序
    pub async fn list_all(&self, portfolio_id: &PortfolioId) -> Vec<Alert> {
        let guard = self.alerts.read().await;
        let mut alerts: Vec<Alert> = guard
            .values()
            .filter(|a| a.portfolio_id == *portfolio_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        alerts
    }
}

#[async_trait]
impl AlertQueue for MemoryAlertQueue {
    async fn create(&self, alert: NewAlert) -> Result<Alert, TradeError> {
        let created = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            portfolio_id: alert.portfolio_id,
            symbol: alert.symbol,
            action: alert.action,
            quantity: alert.quantity,
            status: AlertStatus::Active,
            decision_id: alert.decision_id,
            reason: alert.reason,
            created_at: self.time.now(),
        };
        self.alerts
            .write()
            .await
            .insert(created.id.clone(), created.clone());
        tracing::info!(
            alert_id = %created.id,
            symbol = %created.symbol,
            action = ?created.action,
            quantity = %created.quantity,
            "alert queued"
        );
        Ok(created)
    }

    async fn list_active(&self, portfolio_id: &PortfolioId) -> Result<Vec<Alert>, TradeError> {
        Ok(self
            .list_all(portfolio_id)
            .await
            .into_iter()
            .filter(|a| a.status == AlertStatus::Active)
            .collect())
    }

    async fn cancel(&self, alert_id: &str) -> Result<(), TradeError> {
        let mut guard = self.alerts.write().await;
        let alert = guard
            .get_mut(alert_id)
            .ok_or_else(|| TradeError::AlertNotFound(alert_id.to_string()))?;
        alert.status = AlertStatus::Cancelled;
        Ok(())
    }
}
