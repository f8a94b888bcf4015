pub mod chat;
pub mod finance;
pub mod history;
pub mod live;
pub mod normalizer;
pub mod quick_log;
pub mod summary;
pub mod tracker;
