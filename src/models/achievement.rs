use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: i64,
    pub game_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub points: Option<i64>,
    /// Global completion percentage (0-100) when the platform reports one.
    pub completion_rate: Option<f64>,
    pub is_main_story_completion: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewAchievement {
    pub game_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub points: Option<i64>,
    pub completion_rate: Option<f64>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct AchievementUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub points: Option<i64>,
    pub completion_rate: Option<f64>,
}

impl AchievementUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.points.is_none()
            && self.completion_rate.is_none()
    }

    pub fn apply_to(self, achievement: &mut Achievement) {
        if let Some(name) = self.name {
            achievement.name = name;
        }
        if self.description.is_some() {
            achievement.description = self.description;
        }
        if self.points.is_some() {
            achievement.points = self.points;
        }
        if self.completion_rate.is_some() {
            achievement.completion_rate = self.completion_rate;
        }
    }
}
