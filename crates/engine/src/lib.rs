//! # `conclave-engine` - 决策算法
//!
//! 不含任何副作用的决策计算：选股条件过滤、双顾问合议与单票仓位计算。
//! 组合状态只以只读视图的形式传入，所有函数对相同输入给出相同输出。

pub mod condition;
pub mod consensus;
pub mod error;
pub mod sizing;
