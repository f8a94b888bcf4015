pub mod history;
pub mod records;
pub mod user;
