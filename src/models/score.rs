use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scoring run. Rows are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementScore {
    pub id: i64,
    pub game_id: i64,
    pub score: f64,
    /// Formula version the score was computed with.
    pub method: String,
    pub notes: Option<String>,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEngagementScore {
    pub game_id: i64,
    pub score: f64,
    pub method: String,
    pub notes: Option<String>,
}
