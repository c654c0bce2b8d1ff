pub mod gateway;
pub mod metrics;
pub mod presenter;
pub mod scheduler;
pub mod storage;
