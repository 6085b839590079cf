pub mod analyze;
pub mod cache;
pub mod memory;
pub mod status;
