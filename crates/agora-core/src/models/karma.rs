//! Karma standings and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KarmaEvent {
    pub points: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// A member's karma with their most recent changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KarmaSummary {
    pub username: String,
    pub karma_points: i64,
    pub karma_level: i64,
    #[serde(default)]
    pub recent_history: Vec<KarmaEvent>,
}
