pub mod agent;
pub mod config;
pub mod storage;
pub mod sync;
