pub mod providers;
pub mod storage;
