//! # `conclave-core` - 领域内核
//!
//! 定义策略评估与执行引擎的全部实体、端口 (Port) 与错误类型。
//! 本 crate 不依赖任何具体实现，上层通过 `Arc<dyn Trait>` 注入适配器。
//!
//! ## 模块划分
//! - `strategy`: 策略聚合根、运行记录与决策记录
//! - `advisory`: 外部顾问打分、论点生成与合议端口
//! - `market`: 指标快照读取端口
//! - `trade`: 组合、成交与挂起提醒端口
//! - `benchmark`: 基准指数与绩效序列端口
//! - `cache`: 业务无关的 KV 缓存端口与版本化条目

pub mod advisory;
pub mod benchmark;
pub mod cache;
pub mod common;
pub mod config;
pub mod market;
pub mod store;
pub mod strategy;
pub mod trade;

#[cfg(feature = "test-utils")]
pub mod test_utils;
