pub mod advisory;
pub mod allocator;
pub mod error;
pub mod executor;
pub mod exit;
pub mod journal;
pub mod performance;
pub mod pool;
pub mod reevaluate;
pub mod strategy;
