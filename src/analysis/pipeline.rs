//! Analysis run for one game.
//!
//! Stages run in a fixed order:
//! FETCH_GUIDES → CLASSIFY_ACHIEVEMENT → ESTIMATE_LENGTH → SCORE → PERSIST
//!
//! Every stage writes its result into a slot on [`RunState`]. A failing stage
//! records a [`StageError`] and leaves its slot empty; later stages work with
//! whatever is there. Only the final PERSIST stage can abort a run.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::ai::{AchievementClassifier, Classification};
use crate::analysis::scorer::{self, CompletionSignal, ScoreInputs, ScoreOutcome};
use crate::db::GameStore;
use crate::error::AppError;
use crate::models::{EngagementScore, Game, NewEngagementScore, NewHltbTime};
use crate::services::{GuideSource, LengthLookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    FetchGuides,
    ClassifyAchievement,
    EstimateLength,
    Score,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchGuides => "FETCH_GUIDES",
            Stage::ClassifyAchievement => "CLASSIFY_ACHIEVEMENT",
            Stage::EstimateLength => "ESTIMATE_LENGTH",
            Stage::Score => "SCORE",
            Stage::Persist => "PERSIST",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure confined to one stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub game_id: i64,
    pub score: EngagementScore,
    pub main_story_achievement: Option<String>,
    pub main_story_hours: Option<f64>,
    pub guides_parsed: usize,
    pub stage_errors: Vec<StageError>,
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("game {0} not found")]
    GameNotFound(i64),

    #[error("could not load game {game_id}: {source}")]
    Load {
        game_id: i64,
        #[source]
        source: AppError,
    },

    #[error("persisting the engagement score for game {game_id} failed: {source}")]
    Persistence {
        game_id: i64,
        #[source]
        source: AppError,
        stage_errors: Vec<StageError>,
    },
}

/// Per-run slots, filled stage by stage.
struct RunState {
    game: Game,
    stage_errors: Vec<StageError>,
    // FETCH_GUIDES
    excerpts: Vec<String>,
    guides_parsed: usize,
    // CLASSIFY_ACHIEVEMENT
    completion: Option<CompletionSignal>,
    main_story_achievement: Option<String>,
    // ESTIMATE_LENGTH
    main_story_hours: Option<f64>,
    // SCORE
    outcome: Option<ScoreOutcome>,
}

impl RunState {
    fn new(game: Game) -> Self {
        Self {
            game,
            stage_errors: Vec::new(),
            excerpts: Vec::new(),
            guides_parsed: 0,
            completion: None,
            main_story_achievement: None,
            main_story_hours: None,
            outcome: None,
        }
    }

    fn fail(&mut self, stage: Stage, message: impl Into<String>) {
        let error = StageError {
            stage,
            message: message.into(),
        };
        tracing::warn!(game_id = self.game.id, stage = %error.stage, error = %error.message, "Stage failed");
        self.stage_errors.push(error);
    }
}

pub struct Pipeline {
    store: Arc<dyn GameStore>,
    guides: Arc<dyn GuideSource>,
    classifier: Option<Arc<dyn AchievementClassifier>>,
    lengths: Arc<dyn LengthLookup>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn GameStore>,
        guides: Arc<dyn GuideSource>,
        classifier: Option<Arc<dyn AchievementClassifier>>,
        lengths: Arc<dyn LengthLookup>,
    ) -> Self {
        Self {
            store,
            guides,
            classifier,
            lengths,
        }
    }

    pub async fn analyze(&self, game_id: i64) -> Result<AnalysisReport, AnalyzeError> {
        let game = match self.store.get_game(game_id).await {
            Ok(game) => game,
            Err(AppError::NotFound { .. }) => return Err(AnalyzeError::GameNotFound(game_id)),
            Err(source) => return Err(AnalyzeError::Load { game_id, source }),
        };

        tracing::info!(game_id, title = %game.title, "Starting analysis");
        let mut run = RunState::new(game);

        self.fetch_guides(&mut run).await;
        self.classify_achievement(&mut run).await;
        self.estimate_length(&mut run).await;
        Self::score(&mut run);
        self.persist(run).await
    }

    /// Run independent analyses concurrently. Results keep the input order.
    pub async fn analyze_many(
        &self,
        game_ids: Vec<i64>,
        concurrency: usize,
    ) -> Vec<(i64, Result<AnalysisReport, AnalyzeError>)> {
        let mut results: Vec<_> = stream::iter(game_ids.into_iter().enumerate())
            .map(|(idx, game_id)| async move { (idx, game_id, self.analyze(game_id).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        results.sort_by_key(|(idx, _, _)| *idx);
        results
            .into_iter()
            .map(|(_, game_id, result)| (game_id, result))
            .collect()
    }

    async fn fetch_guides(&self, run: &mut RunState) {
        let guides = match self.store.guides_for_game(run.game.id).await {
            Ok(guides) => guides,
            Err(e) => {
                run.fail(Stage::FetchGuides, format!("loading guides failed: {}", e));
                return;
            }
        };

        for guide in guides {
            match self.guides.fetch(&guide).await {
                Ok(parsed) => {
                    let stored = self
                        .store
                        .upsert_parsed_content(guide.id, parsed.text.clone(), parsed.section_count)
                        .await;
                    if let Err(e) = stored {
                        run.fail(
                            Stage::FetchGuides,
                            format!("guide {}: storing parsed content failed: {}", guide.id, e),
                        );
                    } else {
                        run.guides_parsed += 1;
                    }
                    run.excerpts.push(parsed.text);
                }
                Err(e) => {
                    run.fail(
                        Stage::FetchGuides,
                        format!("guide {} ('{}'): {}", guide.id, guide.title, e),
                    );
                    // Text from an earlier successful parse is still usable.
                    if let Ok(Some(previous)) = self.store.parsed_content_for_guide(guide.id).await {
                        run.excerpts.push(previous.content);
                    }
                }
            }
        }
    }

    async fn classify_achievement(&self, run: &mut RunState) {
        let achievements = match self.store.achievements_for_game(run.game.id).await {
            Ok(achievements) => achievements,
            Err(e) => {
                let reason = format!("loading achievements failed: {}", e);
                run.fail(Stage::ClassifyAchievement, reason.clone());
                run.completion = Some(CompletionSignal::Unavailable { reason });
                return;
            }
        };

        if achievements.is_empty() {
            run.completion = Some(CompletionSignal::NotIdentified {
                reason: "no achievements to analyze".to_string(),
            });
            return;
        }

        let Some(classifier) = &self.classifier else {
            let reason = "reasoning service not configured".to_string();
            run.fail(Stage::ClassifyAchievement, reason.clone());
            run.completion = Some(CompletionSignal::Unavailable { reason });
            return;
        };

        let classification = classifier
            .classify(&run.game.title, &achievements, &run.excerpts)
            .await;

        let completion = match classification {
            Classification::Identified {
                achievement_id,
                name,
                rationale,
            } => {
                tracing::info!(game_id = run.game.id, achievement = %name, %rationale, "Main-story achievement identified");
                if let Err(e) = self
                    .store
                    .mark_main_story_achievement(run.game.id, achievement_id)
                    .await
                {
                    run.fail(
                        Stage::ClassifyAchievement,
                        format!("flagging achievement {} failed: {}", achievement_id, e),
                    );
                }
                let completion_rate = achievements
                    .iter()
                    .find(|a| a.id == achievement_id)
                    .and_then(|a| a.completion_rate);
                run.main_story_achievement = Some(name.clone());
                CompletionSignal::Identified {
                    name,
                    completion_rate,
                }
            }
            Classification::NotIdentified { rationale } => {
                CompletionSignal::NotIdentified { reason: rationale }
            }
            Classification::Error(reason) => {
                run.fail(Stage::ClassifyAchievement, reason.clone());
                CompletionSignal::Unavailable { reason }
            }
        };
        run.completion = Some(completion);
    }

    async fn estimate_length(&self, run: &mut RunState) {
        let estimate = match self
            .lengths
            .estimate(&run.game.title, run.game.platform.as_deref())
            .await
        {
            Ok(estimate) => estimate,
            Err(e) => {
                run.fail(Stage::EstimateLength, e.to_string());
                return;
            }
        };

        run.main_story_hours = Some(estimate.main_story_hours);

        let stored = self
            .store
            .insert_hltb_time(NewHltbTime {
                game_id: run.game.id,
                main_story_hours: Some(estimate.main_story_hours),
                extras_hours: estimate.extras_hours,
                completionist_hours: estimate.completionist_hours,
            })
            .await;
        if let Err(e) = stored {
            run.fail(
                Stage::EstimateLength,
                format!("storing main-story time failed: {}", e),
            );
        }
    }

    fn score(run: &mut RunState) {
        let completion = run
            .completion
            .clone()
            .unwrap_or_else(|| CompletionSignal::Unavailable {
                reason: "classification did not run".to_string(),
            });
        run.outcome = Some(scorer::score(&ScoreInputs {
            completion,
            main_story_hours: run.main_story_hours,
        }));
    }

    async fn persist(&self, run: RunState) -> Result<AnalysisReport, AnalyzeError> {
        let game_id = run.game.id;
        let outcome = run
            .outcome
            .unwrap_or_else(|| scorer::score(&ScoreInputs {
                completion: CompletionSignal::Unavailable {
                    reason: "scoring did not run".to_string(),
                },
                main_story_hours: run.main_story_hours,
            }));

        let score = self
            .store
            .insert_engagement_score(NewEngagementScore {
                game_id,
                score: outcome.score,
                method: outcome.method.to_string(),
                notes: outcome.notes_text(),
            })
            .await
            .map_err(|source| {
                tracing::error!(game_id, error = %source, "Engagement score not saved");
                AnalyzeError::Persistence {
                    game_id,
                    source,
                    stage_errors: run.stage_errors.clone(),
                }
            })?;

        tracing::info!(
            game_id,
            score = score.score,
            stage_errors = run.stage_errors.len(),
            "Analysis complete"
        );

        Ok(AnalysisReport {
            game_id,
            score,
            main_story_achievement: run.main_story_achievement,
            main_story_hours: run.main_story_hours,
            guides_parsed: run.guides_parsed,
            stage_errors: run.stage_errors,
        })
    }
}
