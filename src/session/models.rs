use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three headline scores of a completed session, each 0-100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub digit_span_score: u8,
    pub cognitive_load_score: u8,
    pub average_focus_level: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: SessionResult,
}

impl SessionRecord {
    pub fn new(id: String, started_at: DateTime<Utc>, result: SessionResult) -> Self {
        Self {
            id,
            started_at,
            finished_at: Utc::now(),
            result,
        }
    }
}
