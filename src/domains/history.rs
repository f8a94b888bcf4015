use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domains::records::Table;
use crate::error::LifehubError;

/// The six record kinds that feed the unified history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Task,
    Meal,
    Workout,
    Sleep,
    Session,
    Journal,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Task,
        EventType::Meal,
        EventType::Workout,
        EventType::Sleep,
        EventType::Session,
        EventType::Journal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Meal => "meal",
            Self::Workout => "workout",
            Self::Sleep => "sleep",
            Self::Session => "session",
            Self::Journal => "journal",
        }
    }

    pub fn table(self) -> Table {
        match self {
            Self::Task => Table::Tasks,
            Self::Meal => Table::Meals,
            Self::Workout => Table::Exercise,
            Self::Sleep => Table::SleepLogs,
            Self::Session => Table::ActivitySessions,
            Self::Journal => Table::JournalEntries,
        }
    }

    pub fn from_table(table: Table) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table() == table)
    }

    /// Row field holding the moment the event counts as having happened.
    /// Sleep and timed sessions use their end, everything else its creation.
    pub fn timestamp_field(self) -> &'static str {
        match self {
            Self::Sleep => "wake_time",
            Self::Session => "end_time",
            _ => "created_at",
        }
    }

    /// Events that only exist once an end marker has been written.
    pub fn requires_end_marker(self) -> bool {
        matches!(self, Self::Sleep | Self::Session)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = LifehubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| LifehubError::Serialization(format!("unknown event type: {value}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    #[default]
    Neutral,
    Stressed,
    Excited,
    Tired,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Happy,
        Mood::Neutral,
        Mood::Stressed,
        Mood::Excited,
        Mood::Tired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Neutral => "neutral",
            Self::Stressed => "stressed",
            Self::Excited => "excited",
            Self::Tired => "tired",
        }
    }

    /// Unknown or missing tags read as neutral.
    pub fn parse_or_neutral(value: Option<&str>) -> Self {
        value
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for Mood {
    type Err = LifehubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mood| mood.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| LifehubError::Serialization(format!("unknown mood: {value}")))
    }
}

/// Read-only projection of one source record into the unified feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: i64,
    pub content: String,
    #[serde(
        rename = "secondaryInfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub secondary_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
}

impl HistoryEvent {
    pub fn key(&self) -> (EventType, i64) {
        (self.event_type, self.id)
    }
}
