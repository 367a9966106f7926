pub mod account;
pub mod calendar;
pub mod matcher;
pub mod service;
