pub mod deliberation;
pub mod mem;
