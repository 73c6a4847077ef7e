use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Achievement, EngagementScore, Game, GameUpdate, Guide, HltbTime, NewAchievement,
    NewEngagementScore, NewGame, NewGuide, NewHltbTime, ParsedGuideContent,
};

/// Data-access interface over the game ledger.
///
/// Lookups by id return `AppError::NotFound` when the row is missing. Every
/// write is a single statement or a single transaction.
#[async_trait]
pub trait GameStore: Send + Sync {
    // Games
    async fn create_game(&self, game: NewGame) -> Result<Game>;
    async fn get_game(&self, id: i64) -> Result<Game>;
    async fn find_game_by_steam_app_id(&self, app_id: i64) -> Result<Option<Game>>;
    async fn list_games(&self) -> Result<Vec<Game>>;
    async fn update_game(&self, id: i64, update: GameUpdate) -> Result<Game>;
    async fn delete_game(&self, id: i64) -> Result<()>;

    // Achievements
    async fn create_achievement(&self, achievement: NewAchievement) -> Result<Achievement>;
    async fn get_achievement(&self, id: i64) -> Result<Achievement>;
    async fn achievements_for_game(&self, game_id: i64) -> Result<Vec<Achievement>>;
    async fn update_achievement(&self, achievement: Achievement) -> Result<Achievement>;
    /// Inserts achievements whose name is new for the game; returns how many were added.
    async fn add_achievements(&self, achievements: Vec<NewAchievement>) -> Result<usize>;
    /// Flags `achievement_id` as the main-story completion and clears the flag elsewhere.
    async fn mark_main_story_achievement(&self, game_id: i64, achievement_id: i64) -> Result<()>;

    // Guides
    async fn create_guide(&self, guide: NewGuide) -> Result<Guide>;
    async fn get_guide(&self, id: i64) -> Result<Guide>;
    async fn guides_for_game(&self, game_id: i64) -> Result<Vec<Guide>>;
    async fn update_guide(&self, guide: Guide) -> Result<Guide>;
    /// Inserts guides whose URL is new for the game; returns how many were added.
    async fn add_guides(&self, guides: Vec<NewGuide>) -> Result<usize>;

    // Parsed guide content
    async fn upsert_parsed_content(
        &self,
        guide_id: i64,
        content: String,
        section_count: i64,
    ) -> Result<ParsedGuideContent>;
    async fn parsed_content_for_guide(&self, guide_id: i64) -> Result<Option<ParsedGuideContent>>;

    // Length lookups
    async fn insert_hltb_time(&self, time: NewHltbTime) -> Result<HltbTime>;
    async fn get_hltb_time(&self, id: i64) -> Result<HltbTime>;
    /// Rewrites the hour columns; `looked_up_at` keeps the original lookup time.
    async fn update_hltb_time(&self, time: HltbTime) -> Result<HltbTime>;
    async fn hltb_times_for_game(&self, game_id: i64) -> Result<Vec<HltbTime>>;
    async fn latest_hltb_time(&self, game_id: i64) -> Result<Option<HltbTime>>;

    // Engagement scores
    async fn insert_engagement_score(&self, score: NewEngagementScore) -> Result<EngagementScore>;
    async fn get_engagement_score(&self, id: i64) -> Result<EngagementScore>;
    async fn engagement_scores_for_game(&self, game_id: i64) -> Result<Vec<EngagementScore>>;
}
