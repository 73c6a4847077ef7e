use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    Achievement, EngagementScore, Game, GameUpdate, Guide, HltbTime, NewAchievement,
    NewEngagementScore, NewGame, NewGuide, NewHltbTime, ParsedGuideContent,
};

use super::schema::SCHEMA;
use super::store::GameStore;

const GAME_COLUMNS: &str =
    "id, steam_app_id, title, genre, platform, release_date, description, created_at";
const ACHIEVEMENT_COLUMNS: &str =
    "id, game_id, name, description, points, completion_rate, is_main_story_completion";
const GUIDE_COLUMNS: &str = "id, game_id, title, kind, url, body, author, created_at";
const PARSED_COLUMNS: &str = "id, guide_id, content, section_count, parsed_at";
const HLTB_COLUMNS: &str =
    "id, game_id, main_story_hours, extras_hours, completionist_hours, looked_up_at";
const SCORE_COLUMNS: &str = "id, game_id, score, method, notes, calculated_at";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl GameStore for Repository {
    // Game operations

    async fn create_game(&self, game: NewGame) -> Result<Game> {
        let created = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO games (steam_app_id, title, genre, platform, release_date, description)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        game.steam_app_id,
                        game.title,
                        game.genre,
                        game.platform,
                        game.release_date,
                        game.description,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let game = conn.query_row(
                    &format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS),
                    params![id],
                    game_from_row,
                )?;
                Ok(game)
            })
            .await?;
        tracing::debug!(game_id = created.id, title = %created.title, "Created game");
        Ok(created)
    }

    async fn get_game(&self, id: i64) -> Result<Game> {
        self.conn
            .call(move |conn| {
                let game = conn
                    .query_row(
                        &format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS),
                        params![id],
                        game_from_row,
                    )
                    .optional()?;
                Ok(game)
            })
            .await?
            .ok_or_else(|| AppError::not_found("game", id))
    }

    async fn find_game_by_steam_app_id(&self, app_id: i64) -> Result<Option<Game>> {
        let game = self
            .conn
            .call(move |conn| {
                let game = conn
                    .query_row(
                        &format!("SELECT {} FROM games WHERE steam_app_id = ?1", GAME_COLUMNS),
                        params![app_id],
                        game_from_row,
                    )
                    .optional()?;
                Ok(game)
            })
            .await?;
        Ok(game)
    }

    async fn list_games(&self) -> Result<Vec<Game>> {
        let games = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM games ORDER BY title, id", GAME_COLUMNS))?;
                let games = stmt
                    .query_map([], game_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(games)
            })
            .await?;
        Ok(games)
    }

    async fn update_game(&self, id: i64, update: GameUpdate) -> Result<Game> {
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE games SET
                           title = COALESCE(?2, title),
                           genre = COALESCE(?3, genre),
                           platform = COALESCE(?4, platform),
                           release_date = COALESCE(?5, release_date),
                           description = COALESCE(?6, description)
                       WHERE id = ?1"#,
                    params![
                        id,
                        update.title,
                        update.genre,
                        update.platform,
                        update.release_date,
                        update.description,
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let game = conn.query_row(
                    &format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS),
                    params![id],
                    game_from_row,
                )?;
                Ok(Some(game))
            })
            .await?
            .ok_or_else(|| AppError::not_found("game", id))
    }

    async fn delete_game(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM games WHERE id = ?1", params![id])?;
                Ok(deleted)
            })
            .await?;
        if deleted == 0 {
            return Err(AppError::not_found("game", id));
        }
        Ok(())
    }

    // Achievement operations

    async fn create_achievement(&self, achievement: NewAchievement) -> Result<Achievement> {
        let achievement = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO achievements (game_id, name, description, points, completion_rate)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        achievement.game_id,
                        achievement.name,
                        achievement.description,
                        achievement.points,
                        achievement.completion_rate,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let achievement = conn.query_row(
                    &format!("SELECT {} FROM achievements WHERE id = ?1", ACHIEVEMENT_COLUMNS),
                    params![id],
                    achievement_from_row,
                )?;
                Ok(achievement)
            })
            .await?;
        Ok(achievement)
    }

    async fn get_achievement(&self, id: i64) -> Result<Achievement> {
        self.conn
            .call(move |conn| {
                let achievement = conn
                    .query_row(
                        &format!("SELECT {} FROM achievements WHERE id = ?1", ACHIEVEMENT_COLUMNS),
                        params![id],
                        achievement_from_row,
                    )
                    .optional()?;
                Ok(achievement)
            })
            .await?
            .ok_or_else(|| AppError::not_found("achievement", id))
    }

    async fn achievements_for_game(&self, game_id: i64) -> Result<Vec<Achievement>> {
        let achievements = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM achievements WHERE game_id = ?1 ORDER BY id",
                    ACHIEVEMENT_COLUMNS
                ))?;
                let achievements = stmt
                    .query_map(params![game_id], achievement_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(achievements)
            })
            .await?;
        Ok(achievements)
    }

    async fn update_achievement(&self, achievement: Achievement) -> Result<Achievement> {
        let id = achievement.id;
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE achievements SET
                           name = ?2,
                           description = ?3,
                           points = ?4,
                           completion_rate = ?5,
                           is_main_story_completion = ?6
                       WHERE id = ?1"#,
                    params![
                        achievement.id,
                        achievement.name,
                        achievement.description,
                        achievement.points,
                        achievement.completion_rate,
                        achievement.is_main_story_completion,
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                Ok(Some(achievement))
            })
            .await?
            .ok_or_else(|| AppError::not_found("achievement", id))
    }

    async fn add_achievements(&self, achievements: Vec<NewAchievement>) -> Result<usize> {
        let added = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut added = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO achievements (game_id, name, description, points, completion_rate)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for achievement in &achievements {
                        added += stmt.execute(params![
                            achievement.game_id,
                            achievement.name,
                            achievement.description,
                            achievement.points,
                            achievement.completion_rate,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(added)
            })
            .await?;
        Ok(added)
    }

    async fn mark_main_story_achievement(&self, game_id: i64, achievement_id: i64) -> Result<()> {
        let marked = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE achievements SET is_main_story_completion = (id = ?2) WHERE game_id = ?1",
                    params![game_id, achievement_id],
                )?;
                let flagged: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM achievements WHERE game_id = ?1 AND id = ?2",
                    params![game_id, achievement_id],
                    |row| row.get(0),
                )?;
                if flagged == 0 {
                    // Dropping the transaction rolls the flag reset back.
                    return Ok(false);
                }
                tx.commit()?;
                Ok(true)
            })
            .await?;
        if !marked {
            return Err(AppError::not_found("achievement", achievement_id));
        }
        Ok(())
    }

    // Guide operations

    async fn create_guide(&self, guide: NewGuide) -> Result<Guide> {
        let guide = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO guides (game_id, title, kind, url, body, author)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        guide.game_id,
                        guide.title,
                        guide.kind.as_str(),
                        guide.url,
                        guide.body,
                        guide.author,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let guide = conn.query_row(
                    &format!("SELECT {} FROM guides WHERE id = ?1", GUIDE_COLUMNS),
                    params![id],
                    guide_from_row,
                )?;
                Ok(guide)
            })
            .await?;
        Ok(guide)
    }

    async fn get_guide(&self, id: i64) -> Result<Guide> {
        self.conn
            .call(move |conn| {
                let guide = conn
                    .query_row(
                        &format!("SELECT {} FROM guides WHERE id = ?1", GUIDE_COLUMNS),
                        params![id],
                        guide_from_row,
                    )
                    .optional()?;
                Ok(guide)
            })
            .await?
            .ok_or_else(|| AppError::not_found("guide", id))
    }

    async fn guides_for_game(&self, game_id: i64) -> Result<Vec<Guide>> {
        let guides = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM guides WHERE game_id = ?1 ORDER BY id",
                    GUIDE_COLUMNS
                ))?;
                let guides = stmt
                    .query_map(params![game_id], guide_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(guides)
            })
            .await?;
        Ok(guides)
    }

    async fn update_guide(&self, guide: Guide) -> Result<Guide> {
        let id = guide.id;
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE guides SET title = ?2, kind = ?3, url = ?4, body = ?5, author = ?6 WHERE id = ?1",
                    params![
                        guide.id,
                        guide.title,
                        guide.kind.as_str(),
                        guide.url,
                        guide.body,
                        guide.author,
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                Ok(Some(guide))
            })
            .await?
            .ok_or_else(|| AppError::not_found("guide", id))
    }

    async fn add_guides(&self, guides: Vec<NewGuide>) -> Result<usize> {
        let added = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut added = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO guides (game_id, title, kind, url, body, author)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for guide in &guides {
                        added += stmt.execute(params![
                            guide.game_id,
                            guide.title,
                            guide.kind.as_str(),
                            guide.url,
                            guide.body,
                            guide.author,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(added)
            })
            .await?;
        Ok(added)
    }

    // Parsed guide content

    async fn upsert_parsed_content(
        &self,
        guide_id: i64,
        content: String,
        section_count: i64,
    ) -> Result<ParsedGuideContent> {
        let parsed = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO parsed_guide_contents (guide_id, content, section_count)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(guide_id) DO UPDATE SET
                           content = excluded.content,
                           section_count = excluded.section_count,
                           parsed_at = datetime('now')"#,
                    params![guide_id, content, section_count],
                )?;
                let parsed = conn.query_row(
                    &format!(
                        "SELECT {} FROM parsed_guide_contents WHERE guide_id = ?1",
                        PARSED_COLUMNS
                    ),
                    params![guide_id],
                    parsed_from_row,
                )?;
                Ok(parsed)
            })
            .await?;
        Ok(parsed)
    }

    async fn parsed_content_for_guide(&self, guide_id: i64) -> Result<Option<ParsedGuideContent>> {
        let parsed = self
            .conn
            .call(move |conn| {
                let parsed = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM parsed_guide_contents WHERE guide_id = ?1",
                            PARSED_COLUMNS
                        ),
                        params![guide_id],
                        parsed_from_row,
                    )
                    .optional()?;
                Ok(parsed)
            })
            .await?;
        Ok(parsed)
    }

    // Length lookups

    async fn insert_hltb_time(&self, time: NewHltbTime) -> Result<HltbTime> {
        let time = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO hltb_times (game_id, main_story_hours, extras_hours, completionist_hours)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        time.game_id,
                        time.main_story_hours,
                        time.extras_hours,
                        time.completionist_hours,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let time = conn.query_row(
                    &format!("SELECT {} FROM hltb_times WHERE id = ?1", HLTB_COLUMNS),
                    params![id],
                    hltb_from_row,
                )?;
                Ok(time)
            })
            .await?;
        Ok(time)
    }

    async fn get_hltb_time(&self, id: i64) -> Result<HltbTime> {
        self.conn
            .call(move |conn| {
                let time = conn
                    .query_row(
                        &format!("SELECT {} FROM hltb_times WHERE id = ?1", HLTB_COLUMNS),
                        params![id],
                        hltb_from_row,
                    )
                    .optional()?;
                Ok(time)
            })
            .await?
            .ok_or_else(|| AppError::not_found("hltb time", id))
    }

    async fn update_hltb_time(&self, time: HltbTime) -> Result<HltbTime> {
        let id = time.id;
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE hltb_times SET main_story_hours = ?2, extras_hours = ?3, completionist_hours = ?4
                     WHERE id = ?1",
                    params![
                        time.id,
                        time.main_story_hours,
                        time.extras_hours,
                        time.completionist_hours,
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                Ok(Some(time))
            })
            .await?
            .ok_or_else(|| AppError::not_found("hltb time", id))
    }

    async fn hltb_times_for_game(&self, game_id: i64) -> Result<Vec<HltbTime>> {
        let times = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM hltb_times WHERE game_id = ?1 ORDER BY looked_up_at DESC, id DESC",
                    HLTB_COLUMNS
                ))?;
                let times = stmt
                    .query_map(params![game_id], hltb_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(times)
            })
            .await?;
        Ok(times)
    }

    async fn latest_hltb_time(&self, game_id: i64) -> Result<Option<HltbTime>> {
        let time = self
            .conn
            .call(move |conn| {
                let time = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM hltb_times WHERE game_id = ?1
                             ORDER BY looked_up_at DESC, id DESC LIMIT 1",
                            HLTB_COLUMNS
                        ),
                        params![game_id],
                        hltb_from_row,
                    )
                    .optional()?;
                Ok(time)
            })
            .await?;
        Ok(time)
    }

    // Engagement scores

    async fn insert_engagement_score(&self, score: NewEngagementScore) -> Result<EngagementScore> {
        let score = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO engagement_scores (game_id, score, method, notes) VALUES (?1, ?2, ?3, ?4)",
                    params![score.game_id, score.score, score.method, score.notes],
                )?;
                let id = conn.last_insert_rowid();
                let score = conn.query_row(
                    &format!("SELECT {} FROM engagement_scores WHERE id = ?1", SCORE_COLUMNS),
                    params![id],
                    score_from_row,
                )?;
                Ok(score)
            })
            .await?;
        Ok(score)
    }

    async fn get_engagement_score(&self, id: i64) -> Result<EngagementScore> {
        self.conn
            .call(move |conn| {
                let score = conn
                    .query_row(
                        &format!("SELECT {} FROM engagement_scores WHERE id = ?1", SCORE_COLUMNS),
                        params![id],
                        score_from_row,
                    )
                    .optional()?;
                Ok(score)
            })
            .await?
            .ok_or_else(|| AppError::not_found("engagement score", id))
    }

    async fn engagement_scores_for_game(&self, game_id: i64) -> Result<Vec<EngagementScore>> {
        let scores = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM engagement_scores WHERE game_id = ?1 ORDER BY id",
                    SCORE_COLUMNS
                ))?;
                let scores = stmt
                    .query_map(params![game_id], score_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(scores)
            })
            .await?;
        Ok(scores)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    Ok(parse_datetime(&raw).unwrap_or_else(Utc::now))
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
    Ok(Game {
        id: row.get(0)?,
        steam_app_id: row.get(1)?,
        title: row.get(2)?,
        genre: row.get(3)?,
        platform: row.get(4)?,
        release_date: row.get(5)?,
        description: row.get(6)?,
        created_at: timestamp(row, 7)?,
    })
}

fn achievement_from_row(row: &Row<'_>) -> rusqlite::Result<Achievement> {
    Ok(Achievement {
        id: row.get(0)?,
        game_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        points: row.get(4)?,
        completion_rate: row.get(5)?,
        is_main_story_completion: row.get::<_, i64>(6)? != 0,
    })
}

fn guide_from_row(row: &Row<'_>) -> rusqlite::Result<Guide> {
    Ok(Guide {
        id: row.get(0)?,
        game_id: row.get(1)?,
        title: row.get(2)?,
        kind: row.get::<_, String>(3)?.parse().unwrap_or_default(),
        url: row.get(4)?,
        body: row.get(5)?,
        author: row.get(6)?,
        created_at: timestamp(row, 7)?,
    })
}

fn parsed_from_row(row: &Row<'_>) -> rusqlite::Result<ParsedGuideContent> {
    Ok(ParsedGuideContent {
        id: row.get(0)?,
        guide_id: row.get(1)?,
        content: row.get(2)?,
        section_count: row.get(3)?,
        parsed_at: timestamp(row, 4)?,
    })
}

fn hltb_from_row(row: &Row<'_>) -> rusqlite::Result<HltbTime> {
    Ok(HltbTime {
        id: row.get(0)?,
        game_id: row.get(1)?,
        main_story_hours: row.get(2)?,
        extras_hours: row.get(3)?,
        completionist_hours: row.get(4)?,
        looked_up_at: timestamp(row, 5)?,
    })
}

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<EngagementScore> {
    Ok(EngagementScore {
        id: row.get(0)?,
        game_id: row.get(1)?,
        score: row.get(2)?,
        method: row.get(3)?,
        notes: row.get(4)?,
        calculated_at: timestamp(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GuideKind;
    use tokio_test::assert_ok;

    async fn repo_with_game() -> (Repository, Game) {
        let repo = Repository::in_memory().await.unwrap();
        let game = repo
            .create_game(NewGame {
                title: "Hollow Knight".to_string(),
                genre: Some("Metroidvania".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        (repo, game)
    }

    fn achievement(game_id: i64, name: &str) -> NewAchievement {
        NewAchievement {
            game_id,
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_game_is_not_found() {
        let repo = Repository::in_memory().await.unwrap();
        let err = repo.get_game(42).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "game", id: 42 }));
    }

    #[tokio::test]
    async fn update_game_keeps_unset_columns() {
        let (repo, game) = repo_with_game().await;
        let updated = repo
            .update_game(
                game.id,
                GameUpdate {
                    platform: Some("PC".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Hollow Knight");
        assert_eq!(updated.genre.as_deref(), Some("Metroidvania"));
        assert_eq!(updated.platform.as_deref(), Some("PC"));
    }

    #[tokio::test]
    async fn add_achievements_skips_existing_names() {
        let (repo, game) = repo_with_game().await;
        assert_ok!(repo.create_achievement(achievement(game.id, "Falsehood")).await);

        let added = repo
            .add_achievements(vec![
                achievement(game.id, "Falsehood"),
                achievement(game.id, "Sealed Siblings"),
            ])
            .await
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(repo.achievements_for_game(game.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn add_guides_skips_known_urls() {
        let (repo, game) = repo_with_game().await;
        let link = |url: &str| NewGuide {
            game_id: game.id,
            title: "Walkthrough".to_string(),
            kind: GuideKind::Link,
            url: Some(url.to_string()),
            ..Default::default()
        };

        let first = repo
            .add_guides(vec![link("https://a.example/1"), link("https://a.example/2")])
            .await
            .unwrap();
        let second = repo
            .add_guides(vec![link("https://a.example/2"), link("https://a.example/3")])
            .await
            .unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 1);
        assert_eq!(repo.guides_for_game(game.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn marking_main_story_flags_exactly_one() {
        let (repo, game) = repo_with_game().await;
        let a = repo.create_achievement(achievement(game.id, "A")).await.unwrap();
        let b = repo.create_achievement(achievement(game.id, "B")).await.unwrap();

        repo.mark_main_story_achievement(game.id, a.id).await.unwrap();
        repo.mark_main_story_achievement(game.id, b.id).await.unwrap();

        let flagged: Vec<_> = repo
            .achievements_for_game(game.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.is_main_story_completion)
            .map(|a| a.id)
            .collect();
        assert_eq!(flagged, vec![b.id]);
    }

    #[tokio::test]
    async fn marking_foreign_achievement_leaves_flags_alone() {
        let (repo, game) = repo_with_game().await;
        let other = repo
            .create_game(NewGame {
                title: "Celeste".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let a = repo.create_achievement(achievement(game.id, "A")).await.unwrap();
        let foreign = repo.create_achievement(achievement(other.id, "X")).await.unwrap();
        repo.mark_main_story_achievement(game.id, a.id).await.unwrap();

        let err = repo
            .mark_main_story_achievement(game.id, foreign.id)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(repo.get_achievement(a.id).await.unwrap().is_main_story_completion);
    }

    #[tokio::test]
    async fn parsed_content_is_overwritten() {
        let (repo, game) = repo_with_game().await;
        let guide = repo
            .create_guide(NewGuide {
                game_id: game.id,
                title: "Notes".to_string(),
                kind: GuideKind::Text,
                body: Some("# Act 1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let first = repo
            .upsert_parsed_content(guide.id, "old".to_string(), 1)
            .await
            .unwrap();
        let second = repo
            .upsert_parsed_content(guide.id, "new".to_string(), 3)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let stored = repo.parsed_content_for_guide(guide.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "new");
        assert_eq!(stored.section_count, 3);
    }

    #[tokio::test]
    async fn latest_hltb_time_is_newest_row() {
        let (repo, game) = repo_with_game().await;
        for hours in [20.0, 27.5] {
            repo.insert_hltb_time(NewHltbTime {
                game_id: game.id,
                main_story_hours: Some(hours),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let latest = repo.latest_hltb_time(game.id).await.unwrap().unwrap();
        assert_eq!(latest.main_story_hours, Some(27.5));
        assert_eq!(repo.hltb_times_for_game(game.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_game_cascades() {
        let (repo, game) = repo_with_game().await;
        repo.create_achievement(achievement(game.id, "A")).await.unwrap();
        repo.insert_engagement_score(NewEngagementScore {
            game_id: game.id,
            score: 12.0,
            method: "test".to_string(),
            notes: None,
        })
        .await
        .unwrap();

        repo.delete_game(game.id).await.unwrap();

        assert!(repo.achievements_for_game(game.id).await.unwrap().is_empty());
        assert!(repo.engagement_scores_for_game(game.id).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_game(game.id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn on_disk_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.db");
        let path = path.to_str().unwrap();

        {
            let repo = Repository::new(path).await.unwrap();
            repo.create_game(NewGame {
                title: "Outer Wilds".to_string(),
                steam_app_id: Some(753640),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let repo = Repository::new(path).await.unwrap();
        let found = repo.find_game_by_steam_app_id(753640).await.unwrap();
        assert_eq!(found.map(|g| g.title).as_deref(), Some("Outer Wilds"));
    }

    #[tokio::test]
    async fn missing_database_directory_is_created_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("nested").join("games.db");

        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        assert_ok!(repo.list_games().await);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn lookups_and_updates_of_missing_rows_are_not_found() {
        let (repo, game) = repo_with_game().await;
        let achievement = repo
            .create_achievement(achievement(game.id, "Falsehood"))
            .await
            .unwrap();
        let guide = repo
            .create_guide(NewGuide {
                game_id: game.id,
                title: "Notes".to_string(),
                kind: GuideKind::Text,
                body: Some("text".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let time = repo
            .insert_hltb_time(NewHltbTime {
                game_id: game.id,
                main_story_hours: Some(27.0),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = repo
            .update_achievement(Achievement { id: 999, ..achievement })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "achievement", id: 999 }));

        let err = repo.get_guide(999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "guide", id: 999 }));
        let err = repo.update_guide(Guide { id: 999, ..guide }).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "guide", id: 999 }));

        let err = repo.get_hltb_time(999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "hltb time", id: 999 }));
        let err = repo
            .update_hltb_time(HltbTime { id: 999, ..time })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "hltb time", id: 999 }));

        let err = repo.get_engagement_score(999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "engagement score", id: 999 }));
    }

    #[tokio::test]
    async fn updates_are_visible_on_reread() {
        let (repo, game) = repo_with_game().await;

        let mut achievement = repo
            .create_achievement(achievement(game.id, "Falsehood"))
            .await
            .unwrap();
        achievement.completion_rate = Some(71.5);
        achievement.points = Some(10);
        repo.update_achievement(achievement.clone()).await.unwrap();
        let reread = repo.get_achievement(achievement.id).await.unwrap();
        assert_eq!(reread.completion_rate, Some(71.5));
        assert_eq!(reread.points, Some(10));

        let mut guide = repo
            .create_guide(NewGuide {
                game_id: game.id,
                title: "Walkthrough".to_string(),
                url: Some("https://guides.example/hk".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        guide.title = "Full walkthrough".to_string();
        guide.author = Some("Quirrel".to_string());
        repo.update_guide(guide.clone()).await.unwrap();
        let reread = repo.get_guide(guide.id).await.unwrap();
        assert_eq!(reread.title, "Full walkthrough");
        assert_eq!(reread.author.as_deref(), Some("Quirrel"));
        assert_eq!(reread.kind, GuideKind::Link);

        let mut time = repo
            .insert_hltb_time(NewHltbTime {
                game_id: game.id,
                main_story_hours: Some(27.0),
                ..Default::default()
            })
            .await
            .unwrap();
        time.main_story_hours = Some(26.5);
        time.completionist_hours = Some(62.0);
        repo.update_hltb_time(time.clone()).await.unwrap();
        let reread = repo.get_hltb_time(time.id).await.unwrap();
        assert_eq!(reread.main_story_hours, Some(26.5));
        assert_eq!(reread.completionist_hours, Some(62.0));
        assert_eq!(reread.looked_up_at, time.looked_up_at);

        let score = repo
            .insert_engagement_score(NewEngagementScore {
                game_id: game.id,
                score: 88.0,
                method: "length-completion/v1".to_string(),
                notes: None,
            })
            .await
            .unwrap();
        let reread = repo.get_engagement_score(score.id).await.unwrap();
        assert_eq!(reread.score, 88.0);
        assert_eq!(reread.method, "length-completion/v1");
    }
}
