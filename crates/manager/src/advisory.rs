use conclave_core::advisory::entity::{AdvisorId, Deliberation, Opinion, Thesis, ThesisContext};
use conclave_core::advisory::error::AdvisoryError;
use conclave_core::advisory::port::{AdvisoryScorer, DeliberationService, ThesisGenerator};
use conclave_core::config::RetryConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// # Summary
/// 指数退避重试参数，对每个后端独立计数。
///
/// # Invariants
/// - 第 n 次失败后的等待为 `base * 2^(n-1)`，不超过 `max_delay`。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// # Summary
    /// 依次尝试各个后端，每个后端内部按指数退避重试。
    ///
    /// # Logic
    /// 1. 没有后端时直接返回 `NoBackend`。
    /// 2. 可重试错误在当前后端上继续重试，不可重试错误立即切换到下一个后端。
    /// 3. 任一调用成功立即返回；全部失败返回 `Exhausted`，附带最后一个错误。
    ///
    /// # Arguments
    /// * `what`: 调用描述，用于日志
    /// * `backends`: 后端名称，与 `attempt` 的下标一一对应
    /// * `attempt`: 对第 i 个后端发起一次调用
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        backends: &[String],
        mut attempt: F,
    ) -> Result<T, AdvisoryError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, AdvisoryError>>,
    {
        if backends.is_empty() {
            return Err(AdvisoryError::NoBackend(what.to_string()));
        }
        let mut last_error: Option<AdvisoryError> = None;
        for (index, backend) in backends.iter().enumerate() {
            for n in 1..=self.max_attempts {
                match attempt(index).await {
                    Ok(value) => {
                        if n > 1 || index > 0 {
                            debug!(what, backend = %backend, attempt = n, "advisory call recovered");
                        }
                        return Ok(value);
                    }
                    Err(e) => {
                        let retry = e.is_retryable() && n < self.max_attempts;
                        warn!(what, backend = %backend, attempt = n, error = %e, retry, "advisory call failed");
                        last_error = Some(e);
                        if !retry {
                            break;
                        }
                        tokio::time::sleep(self.delay_for(n)).await;
                    }
                }
            }
        }
        Err(AdvisoryError::Exhausted(format!(
            "{}: {}",
            what,
            last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string())
        )))
    }
}

/// # Summary
/// 顾问调用门面：按顺序回退的后端列表 + 重试策略。
///
/// # Invariants
/// - 可被工作池中的多个任务并发共享。
pub struct AdvisoryPanel {
    scorers: Vec<Arc<dyn AdvisoryScorer>>,
    thesis_generators: Vec<Arc<dyn ThesisGenerator>>,
    deliberators: Vec<Arc<dyn DeliberationService>>,
    policy: RetryPolicy,
}

impl AdvisoryPanel {
    pub fn new(
        scorers: Vec<Arc<dyn AdvisoryScorer>>,
        thesis_generators: Vec<Arc<dyn ThesisGenerator>>,
        deliberators: Vec<Arc<dyn DeliberationService>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            scorers,
            thesis_generators,
            deliberators,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn score(&self, symbol: &str, advisor: &AdvisorId) -> Result<Opinion, AdvisoryError> {
        let names: Vec<String> = self.scorers.iter().map(|b| b.backend().to_string()).collect();
        let what = format!("score {} by {}", symbol, advisor);
        self.policy
            .run(&what, &names, |i| {
                let backend = self.scorers.get(i).cloned();
                async move {
                    match backend {
                        Some(b) => b.score(symbol, advisor).await,
                        None => Err(AdvisoryError::NoBackend(symbol.to_string())),
                    }
                }
            })
            .await
    }

    pub async fn thesis(
        &self,
        symbol: &str,
        advisor: &AdvisorId,
        context: &ThesisContext,
    ) -> Result<Thesis, AdvisoryError> {
        let names: Vec<String> = self
            .thesis_generators
            .iter()
            .map(|b| b.backend().to_string())
            .collect();
        let what = format!("thesis {} by {}", symbol, advisor);
        self.policy
            .run(&what, &names, |i| {
                let backend = self.thesis_generators.get(i).cloned();
                async move {
                    match backend {
                        Some(b) => b.generate(symbol, advisor, context).await,
                        None => Err(AdvisoryError::NoBackend(symbol.to_string())),
                    }
                }
            })
            .await
    }

    pub async fn deliberate(
        &self,
        symbol: &str,
        first: &Thesis,
        second: &Thesis,
    ) -> Result<Deliberation, AdvisoryError> {
        let names: Vec<String> = self
            .deliberators
            .iter()
            .map(|b| b.backend().to_string())
            .collect();
        let what = format!("deliberation {}", symbol);
        self.policy
            .run(&what, &names, |i| {
                let backend = self.deliberators.get(i).cloned();
                async move {
                    match backend {
                        Some(b) => b.deliberate(symbol, first, second).await,
                        None => Err(AdvisoryError::NoBackend(symbol.to_string())),
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::advisory::entity::AdvisoryStatus;
    use conclave_core::test_utils::ScriptedScorer;
    use rust_decimal_macros::dec;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let scorer = Arc::new(ScriptedScorer::new("primary"));
        scorer.set("AAPL", "lynch", dec!(75), AdvisoryStatus::Buy);
        scorer.fail_first("AAPL", 2);
        let panel = AdvisoryPanel::new(vec![scorer.clone()], vec![], vec![], fast_policy(3));

        let opinion = panel.score("AAPL", &AdvisorId::new("lynch")).await.unwrap();
        assert_eq!(opinion.score, dec!(75));
        assert_eq!(scorer.calls(), 3);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_backend() {
        let primary = Arc::new(ScriptedScorer::new("primary"));
        primary.fail_first("AAPL", 10);
        let secondary = Arc::new(ScriptedScorer::new("secondary"));
        secondary.set("AAPL", "lynch", dec!(61), AdvisoryStatus::Hold);
        let panel = AdvisoryPanel::new(
            vec![primary.clone(), secondary.clone()],
            vec![],
            vec![],
            fast_policy(2),
        );

        let opinion = panel.score("AAPL", &AdvisorId::new("lynch")).await.unwrap();
        assert_eq!(opinion.status, AdvisoryStatus::Hold);
        assert_eq!(primary.calls(), 2);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried_and_exhausts() {
        let scorer = Arc::new(ScriptedScorer::new("primary"));
        scorer.reject("AAPL", "unknown ticker");
        let panel = AdvisoryPanel::new(vec![scorer.clone()], vec![], vec![], fast_policy(3));

        let err = panel.score("AAPL", &AdvisorId::new("lynch")).await.unwrap_err();
        assert!(matches!(err, AdvisoryError::Exhausted(_)));
        assert!(err.to_string().contains("unknown ticker"));
        assert_eq!(scorer.calls(), 1);

        let empty = AdvisoryPanel::new(vec![], vec![], vec![], fast_policy(3));
        assert!(matches!(
            empty.score("AAPL", &AdvisorId::new("lynch")).await,
            Err(AdvisoryError::NoBackend(_))
        ));
    }
}
