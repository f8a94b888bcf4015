pub mod client;
pub mod config;
pub mod daemon;
pub mod domains;
pub mod error;
pub mod factories;
pub mod interfaces;
pub mod local_time;
pub mod providers;
pub mod services;

pub use crate::client::LifeHub;
pub use crate::config::Config;
pub use crate::domains::history::{EventType, HistoryEvent, Mood};
pub use crate::domains::user::UserContext;
pub use crate::error::{LifehubError, Result};
pub use crate::services::history::{HistoryQuery, HistoryService};
pub use crate::services::live::LiveFeed;
pub use crate::services::summary::SummaryOutcome;
