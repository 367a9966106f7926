pub mod alert;
pub mod benchmark;
pub mod config;
pub mod run;
pub mod strategy;
