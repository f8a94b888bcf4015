//! Best-effort categorisation of free-text quick-log input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::domains::history::Mood;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuickLogEntry {
    Task {
        description: String,
    },
    Meal {
        name: String,
        calories: i64,
    },
    Workout {
        activity_type: String,
        distance_km: Option<f64>,
        duration_mins: Option<i64>,
    },
    Journal {
        content: String,
        mood: Mood,
    },
}

pub trait QuickLogClassifier: Send + Sync {
    /// Never fails; text nothing recognises becomes a task.
    fn classify(&self, text: &str) -> QuickLogEntry;
}

static JOURNAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:journal|diary|dear diary|note to self)\s*[:,\-]?\s*(?P<body>.+)$")
        .expect("static regex")
});

static MEAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:ate|had|eaten|eating|lunch|dinner|breakfast|snack)\b\s*[:,\-]?\s*(?P<name>.+?)(?:\s*[(,]?\s*(?P<kcal>\d+)\s*(?:kcal|cal|calories)\)?)?\s*$",
    )
    .expect("static regex")
});

static WORKOUT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<verb>ran|run|running|walked|walk|walking|cycled|biked|cycling|swam|swimming|hiked|lifted|gym|yoga|workout)\b(?P<rest>.*)$",
    )
    .expect("static regex")
});

static DISTANCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<km>\d+(?:\.\d+)?)\s*(?:km|k)\b").expect("static regex")
});

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?P<mins>\d+)\s*(?:min|mins|minutes|m)\b").expect("static regex")
});

static MOOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?P<mood>happy|stressed|excited|tired|neutral)\b")
        .expect("static regex")
});

fn workout_label(verb: &str) -> &'static str {
    match verb.to_ascii_lowercase().as_str() {
        "ran" | "run" | "running" => "Run",
        "walked" | "walk" | "walking" => "Walk",
        "cycled" | "biked" | "cycling" => "Cycling",
        "swam" | "swimming" => "Swim",
        "hiked" => "Hike",
        "yoga" => "Yoga",
        _ => "Workout",
    }
}

/// Keyword and pattern heuristics. Journal prefixes win over meals, meals
/// over workouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexClassifier;

impl QuickLogClassifier for RegexClassifier {
    fn classify(&self, text: &str) -> QuickLogEntry {
        let text = text.trim();

        if let Some(caps) = JOURNAL_RE.captures(text) {
            let content = caps["body"].trim().to_string();
            let mood = MOOD_RE
                .captures(&content)
                .map(|m| Mood::parse_or_neutral(Some(&m["mood"])))
                .unwrap_or_default();
            return QuickLogEntry::Journal { content, mood };
        }

        if let Some(caps) = MEAL_RE.captures(text) {
            let name = caps["name"].trim().trim_end_matches([',', '(']).trim();
            if !name.is_empty() {
                let calories = caps
                    .name("kcal")
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0);
                return QuickLogEntry::Meal {
                    name: name.to_string(),
                    calories,
                };
            }
        }

        if let Some(caps) = WORKOUT_RE.captures(text) {
            let rest = &caps["rest"];
            return QuickLogEntry::Workout {
                activity_type: workout_label(&caps["verb"]).to_string(),
                distance_km: DISTANCE_RE
                    .captures(rest)
                    .and_then(|m| m["km"].parse().ok()),
                duration_mins: DURATION_RE
                    .captures(rest)
                    .and_then(|m| m["mins"].parse().ok()),
            };
        }

        QuickLogEntry::Task {
            description: text.to_string(),
        }
    }
}
