use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

mod ai;
mod analysis;
mod app;
mod config;
mod db;
mod error;
mod models;
mod services;

use app::App;
use config::Config;
use models::{
    AchievementUpdate, GameUpdate, GuideKind, GuideUpdate, HltbTimeUpdate, NewAchievement, NewGame,
    NewGuide,
};

/// Track games and score how engaging they are.
#[derive(Parser, Debug)]
#[command(name = "engage", version, about)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "ENGAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a game
    AddGame(GameFields),
    /// Change fields of an existing game
    UpdateGame {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: OptionalGameFields,
    },
    /// Delete a game and everything stored for it
    RemoveGame { id: i64 },
    /// Add an achievement to a game
    AddAchievement {
        game_id: i64,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        points: Option<i64>,
        /// Global completion rate in percent
        #[arg(long)]
        completion_rate: Option<f64>,
    },
    /// Change fields of an existing achievement
    UpdateAchievement {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        points: Option<i64>,
        #[arg(long)]
        completion_rate: Option<f64>,
    },
    /// Add a guide to a game, either a link or inline text
    AddGuide {
        game_id: i64,
        title: String,
        #[arg(long, conflicts_with = "body")]
        url: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        author: Option<String>,
    },
    /// Change fields of an existing guide
    UpdateGuide {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        author: Option<String>,
    },
    /// Correct a stored main-story time lookup
    UpdateHltb {
        id: i64,
        #[arg(long)]
        main_story_hours: Option<f64>,
        #[arg(long)]
        extras_hours: Option<f64>,
        #[arg(long)]
        completionist_hours: Option<f64>,
    },
    /// List all games
    List,
    /// Show one game with its achievements, guides and latest results
    Show { id: i64 },
    /// Show every engagement score recorded for a game
    History { id: i64 },
    /// Show one engagement score
    Score { id: i64 },
    /// Import games from Steam; ids separated by commas or newlines
    Import { app_ids: String },
    /// Run the analysis pipeline for one or more games
    Analyze {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[derive(Args, Debug)]
struct GameFields {
    title: String,
    #[arg(long)]
    steam_app_id: Option<i64>,
    #[command(flatten)]
    fields: OptionalGameFields,
}

#[derive(Args, Debug)]
struct OptionalGameFields {
    #[arg(long)]
    genre: Option<String>,
    #[arg(long)]
    platform: Option<String>,
    #[arg(long)]
    release_date: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Only show warnings and errors unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let app = App::new(&config).await.context("opening the game database")?;

    let ok = run(&app, cli.command, cli.json).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Executes one command; `Ok(false)` means some analysis failed.
async fn run(app: &App, command: Command, json: bool) -> anyhow::Result<bool> {
    match command {
        Command::AddGame(GameFields {
            title,
            steam_app_id,
            fields,
        }) => {
            let game = app
                .add_game(NewGame {
                    steam_app_id,
                    title,
                    genre: fields.genre,
                    platform: fields.platform,
                    release_date: fields.release_date,
                    description: fields.description,
                })
                .await?;
            emit(json, &game, || format!("Added game {}: {}", game.id, game.title))?;
        }

        Command::UpdateGame { id, title, fields } => {
            let game = app
                .update_game(
                    id,
                    GameUpdate {
                        title,
                        genre: fields.genre,
                        platform: fields.platform,
                        release_date: fields.release_date,
                        description: fields.description,
                    },
                )
                .await?;
            emit(json, &game, || format!("Updated game {}: {}", game.id, game.title))?;
        }

        Command::RemoveGame { id } => {
            app.remove_game(id).await?;
            emit(json, &json!({ "removed": id }), || format!("Removed game {}", id))?;
        }

        Command::AddAchievement {
            game_id,
            name,
            description,
            points,
            completion_rate,
        } => {
            let achievement = app
                .add_achievement(NewAchievement {
                    game_id,
                    name,
                    description,
                    points,
                    completion_rate,
                })
                .await?;
            emit(json, &achievement, || {
                format!("Added achievement {}: {}", achievement.id, achievement.name)
            })?;
        }

        Command::UpdateAchievement {
            id,
            name,
            description,
            points,
            completion_rate,
        } => {
            let achievement = app
                .update_achievement(
                    id,
                    AchievementUpdate {
                        name,
                        description,
                        points,
                        completion_rate,
                    },
                )
                .await?;
            emit(json, &achievement, || {
                format!("Updated achievement {}: {}", achievement.id, achievement.name)
            })?;
        }

        Command::AddGuide {
            game_id,
            title,
            url,
            body,
            author,
        } => {
            let kind = if body.is_some() {
                GuideKind::Text
            } else {
                GuideKind::Link
            };
            let guide = app
                .add_guide(NewGuide {
                    game_id,
                    title,
                    kind,
                    url,
                    body,
                    author,
                })
                .await?;
            emit(json, &guide, || {
                format!("Added {} guide {}: {}", guide.kind, guide.id, guide.title)
            })?;
        }

        Command::UpdateGuide {
            id,
            title,
            url,
            body,
            author,
        } => {
            let guide = app
                .update_guide(
                    id,
                    GuideUpdate {
                        title,
                        url,
                        body,
                        author,
                    },
                )
                .await?;
            emit(json, &guide, || {
                format!("Updated {} guide {}: {}", guide.kind, guide.id, guide.title)
            })?;
        }

        Command::UpdateHltb {
            id,
            main_story_hours,
            extras_hours,
            completionist_hours,
        } => {
            let time = app
                .update_hltb_time(
                    id,
                    HltbTimeUpdate {
                        main_story_hours,
                        extras_hours,
                        completionist_hours,
                    },
                )
                .await?;
            emit(json, &time, || {
                format!(
                    "Updated length lookup {} for game {}: main story {}",
                    time.id,
                    time.game_id,
                    time.main_story_hours
                        .map(|h| format!("{:.1}h", h))
                        .unwrap_or_else(|| "unknown".to_string())
                )
            })?;
        }

        Command::List => {
            let games = app.list_games().await?;
            emit(json, &games, || {
                games
                    .iter()
                    .map(|g| {
                        format!(
                            "{:>5}  {}{}",
                            g.id,
                            g.title,
                            g.platform
                                .as_deref()
                                .map(|p| format!(" [{}]", p))
                                .unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }

        Command::Show { id } => {
            let details = app.game_details(id).await?;
            emit(json, &details, || {
                let mut lines = vec![format!("{} (id {})", details.game.title, details.game.id)];
                if let Some(app_id) = details.game.steam_app_id {
                    lines.push(format!("Steam app: {}", app_id));
                }
                lines.push(format!("Achievements: {}", details.achievements.len()));
                for a in &details.achievements {
                    let marker = if a.is_main_story_completion { "*" } else { " " };
                    let rate = a
                        .completion_rate
                        .map(|r| format!(" ({:.1}%)", r))
                        .unwrap_or_default();
                    lines.push(format!("  {} {}{}", marker, a.name, rate));
                }
                lines.push(format!("Guides: {}", details.guides.len()));
                for g in &details.guides {
                    lines.push(format!("    [{}] {}", g.kind, g.title));
                }
                if let Some(hours) = details.latest_hltb.as_ref().and_then(|t| t.main_story_hours) {
                    lines.push(format!("Main story: {:.1}h", hours));
                }
                if let Some(score) = &details.latest_score {
                    lines.push(format!("Engagement score: {:.1} ({})", score.score, score.method));
                }
                lines.join("\n")
            })?;
        }

        Command::History { id } => {
            let scores = app.score_history(id).await?;
            emit(json, &scores, || {
                scores
                    .iter()
                    .map(|s| {
                        format!(
                            "{}  {:>7.2}  {}{}",
                            s.calculated_at.format("%Y-%m-%d %H:%M"),
                            s.score,
                            s.method,
                            s.notes
                                .as_deref()
                                .map(|n| format!("  ({})", n))
                                .unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }

        Command::Score { id } => {
            let score = app.engagement_score(id).await?;
            emit(json, &score, || {
                format!(
                    "Score {} for game {}: {:.2} ({}, {}){}",
                    score.id,
                    score.game_id,
                    score.score,
                    score.method,
                    score.calculated_at.format("%Y-%m-%d %H:%M"),
                    score
                        .notes
                        .as_deref()
                        .map(|n| format!("\n  notes: {}", n))
                        .unwrap_or_default()
                )
            })?;
        }

        Command::Import { app_ids } => {
            let outcomes = app.import_steam(&app_ids).await?;
            emit(json, &outcomes, || {
                outcomes
                    .iter()
                    .map(|o| {
                        let mut line = format!(
                            "app {}: {:?}, +{} achievements, +{} guides",
                            o.app_id, o.status, o.achievements_added, o.guides_added
                        );
                        if let Some(error) = &o.error {
                            line.push_str(&format!(" ({})", error));
                        }
                        line
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }

        Command::Analyze { ids, concurrency } => {
            let results = app.analyze(ids, concurrency).await;
            let all_ok = results.iter().all(|(_, r)| r.is_ok());

            if json {
                let values: Vec<_> = results
                    .iter()
                    .map(|(id, result)| match result {
                        Ok(report) => json!({ "game_id": id, "ok": true, "report": report }),
                        Err(e) => json!({ "game_id": id, "ok": false, "error": e.to_string() }),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                for (id, result) in &results {
                    match result {
                        Ok(report) => {
                            println!("game {}: score {:.2}", id, report.score.score);
                            if let Some(notes) = &report.score.notes {
                                println!("  notes: {}", notes);
                            }
                            for error in &report.stage_errors {
                                println!("  {}", error);
                            }
                        }
                        Err(e) => println!("game {}: failed: {}", id, e),
                    }
                }
            }
            return Ok(all_ok);
        }
    }

    Ok(true)
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}
