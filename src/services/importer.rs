use serde::Serialize;

use crate::db::GameStore;
use crate::error::Result;
use crate::models::{GuideKind, NewAchievement, NewGame, NewGuide};
use crate::services::steam::PlatformCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Ok,
    Partial,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub app_id: i64,
    pub game_id: Option<i64>,
    pub created_game: bool,
    pub achievements_added: usize,
    pub guides_added: usize,
    pub status: ImportStatus,
    pub error: Option<String>,
}

impl ImportOutcome {
    fn failed(app_id: i64, error: String) -> Self {
        Self {
            app_id,
            game_id: None,
            created_game: false,
            achievements_added: 0,
            guides_added: 0,
            status: ImportStatus::Error,
            error: Some(error),
        }
    }
}

/// Split free-form text into app ids. Commas and newlines separate ids,
/// unparseable tokens are skipped and duplicates keep their first position.
pub fn parse_app_ids(text: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    for token in text.split([',', '\n']).map(str::trim) {
        if let Ok(id) = token.parse::<i64>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Import one app: game row, new achievements, new guides.
///
/// Platform failures are reported in the outcome. Only store failures are
/// returned as errors.
pub async fn import_app(
    store: &dyn GameStore,
    catalog: &dyn PlatformCatalog,
    app_id: i64,
) -> Result<ImportOutcome> {
    let schema = match catalog.fetch_achievements(app_id).await {
        Ok(schema) => schema,
        Err(e) => {
            tracing::warn!(app_id, error = %e, "Steam import failed");
            return Ok(ImportOutcome::failed(app_id, e.to_string()));
        }
    };

    let (game, created_game) = match store.find_game_by_steam_app_id(app_id).await? {
        Some(game) => (game, false),
        None => {
            let game = store
                .create_game(NewGame {
                    steam_app_id: Some(app_id),
                    title: schema
                        .game_name
                        .clone()
                        .unwrap_or_else(|| format!("App {}", app_id)),
                    description: Some("Imported from Steam".to_string()),
                    ..Default::default()
                })
                .await?;
            (game, true)
        }
    };

    let achievements = schema
        .achievements
        .into_iter()
        .map(|a| NewAchievement {
            game_id: game.id,
            name: a.name,
            description: a.description,
            points: a.points,
            completion_rate: a.completion_rate,
        })
        .collect();
    let achievements_added = store.add_achievements(achievements).await?;

    let (guides_added, status, error) = match catalog.fetch_guides(app_id).await {
        Ok(guides) => {
            let guides = guides
                .into_iter()
                .map(|g| NewGuide {
                    game_id: game.id,
                    title: g.title,
                    kind: GuideKind::Link,
                    url: Some(g.url),
                    body: None,
                    author: g.author,
                })
                .collect();
            (store.add_guides(guides).await?, ImportStatus::Ok, None)
        }
        Err(e) => (0, ImportStatus::Partial, Some(e.to_string())),
    };

    tracing::info!(
        app_id,
        game_id = game.id,
        created_game,
        achievements_added,
        guides_added,
        "Imported Steam app"
    );

    Ok(ImportOutcome {
        app_id,
        game_id: Some(game.id),
        created_game,
        achievements_added,
        guides_added,
        status,
        error,
    })
}
