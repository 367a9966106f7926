pub mod entity;
pub mod error;
pub mod policy;
pub mod port;
