use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HltbTime {
    pub id: i64,
    pub game_id: i64,
    pub main_story_hours: Option<f64>,
    pub extras_hours: Option<f64>,
    pub completionist_hours: Option<f64>,
    pub looked_up_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewHltbTime {
    pub game_id: i64,
    pub main_story_hours: Option<f64>,
    pub extras_hours: Option<f64>,
    pub completionist_hours: Option<f64>,
}

/// Manual correction of a stored lookup; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct HltbTimeUpdate {
    pub main_story_hours: Option<f64>,
    pub extras_hours: Option<f64>,
    pub completionist_hours: Option<f64>,
}

impl HltbTimeUpdate {
    pub fn is_empty(&self) -> bool {
        self.main_story_hours.is_none()
            && self.extras_hours.is_none()
            && self.completionist_hours.is_none()
    }

    pub fn apply_to(self, time: &mut HltbTime) {
        if self.main_story_hours.is_some() {
            time.main_story_hours = self.main_story_hours;
        }
        if self.extras_hours.is_some() {
            time.extras_hours = self.extras_hours;
        }
        if self.completionist_hours.is_some() {
            time.completionist_hours = self.completionist_hours;
        }
    }
}
