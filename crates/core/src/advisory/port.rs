use crate::advisory::entity::{AdvisorId, Deliberation, Opinion, Thesis, ThesisContext};
use crate::advisory::error::AdvisoryError;
use async_trait::async_trait;

/// # Summary
/// 顾问打分端口。每个实现代表一个后端，编排器按顺序回退。
///
/// # Invariants
/// - 必须允许并发调用。
/// - 超时由实现自行负责，编排器只关心最终成功或失败。
#[async_trait]
pub trait AdvisoryScorer: Send + Sync {
    /// 后端名称，用于日志与失败汇总
    fn backend(&self) -> &str;

    async fn score(&self, symbol: &str, advisor: &AdvisorId) -> Result<Opinion, AdvisoryError>;
}

/// # Summary
/// 投资论点生成端口。
///
/// # Invariants
/// - 幂等：相同输入可以返回外部缓存的同一份论点。
#[async_trait]
pub trait ThesisGenerator: Send + Sync {
    fn backend(&self) -> &str;

    async fn generate(
        &self,
        symbol: &str,
        advisor: &AdvisorId,
        context: &ThesisContext,
    ) -> Result<Thesis, AdvisoryError>;
}

/// # Summary
/// 合议端口：将两份论点归并为一个结论。
#[async_trait]
pub trait DeliberationService: Send + Sync {
    fn backend(&self) -> &str;

    async fn deliberate(
        &self,
        symbol: &str,
        first: &Thesis,
        second: &Thesis,
    ) -> Result<Deliberation, AdvisoryError>;
}
