use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub steam_app_id: Option<i64>,
    pub title: String,
    pub genre: Option<String>,
    pub platform: Option<String>,
    pub release_date: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewGame {
    pub steam_app_id: Option<i64>,
    pub title: String,
    pub genre: Option<String>,
    pub platform: Option<String>,
    pub release_date: Option<String>,
    pub description: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct GameUpdate {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub platform: Option<String>,
    pub release_date: Option<String>,
    pub description: Option<String>,
}

impl GameUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.genre.is_none()
            && self.platform.is_none()
            && self.release_date.is_none()
            && self.description.is_none()
    }
}
