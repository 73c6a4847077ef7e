use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::Achievement;
use crate::services::{RateLimiter, Service};

const MAX_ATTEMPTS: u32 = 2;
const MAX_GUIDE_CHARS: usize = 6000;

const SYSTEM_PROMPT: &str = r#"You label the single achievement that marks completing the main story or campaign of a video game.
Respond ONLY with that exact achievement name.
If no achievement clearly represents finishing the main story, reply with NONE.
Do not add quotes or any extra text."#;

/// Outcome of asking the reasoning service for the main-story achievement.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Identified {
        achievement_id: i64,
        name: String,
        rationale: String,
    },
    NotIdentified {
        rationale: String,
    },
    /// The service was unreachable or its reply was unusable.
    Error(String),
}

#[async_trait]
pub trait AchievementClassifier: Send + Sync {
    async fn classify(
        &self,
        game_title: &str,
        achievements: &[Achievement],
        guide_excerpts: &[String],
    ) -> Classification;
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

enum CallFailure {
    Retryable(String),
    Fatal(String),
}

pub struct Classifier {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    limiter: Arc<RateLimiter>,
}

impl Classifier {
    pub fn new(api_url: String, api_key: String, model: String, limiter: Arc<RateLimiter>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_url,
            api_key,
            model,
            limiter,
        }
    }

    async fn send_once(&self, request: &MessageRequest) -> Result<String, CallFailure> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| CallFailure::Retryable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("API error ({}): {}", status, error_text);
            return Err(if is_retryable(status) {
                CallFailure::Retryable(message)
            } else {
                CallFailure::Fatal(message)
            });
        }

        let message_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| CallFailure::Fatal(format!("undecodable response: {}", e)))?;

        Ok(message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// One request plus at most one retry for transient failures.
    async fn request_reply(&self, request: &MessageRequest) -> Result<String, String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire(Service::Reasoning).await;

            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(CallFailure::Retryable(message)) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %message, "Reasoning request failed, retrying");
                }
                Err(CallFailure::Retryable(message)) | Err(CallFailure::Fatal(message)) => {
                    return Err(message)
                }
            }
        }
    }
}

#[async_trait]
impl AchievementClassifier for Classifier {
    async fn classify(
        &self,
        game_title: &str,
        achievements: &[Achievement],
        guide_excerpts: &[String],
    ) -> Classification {
        if achievements.is_empty() {
            return Classification::NotIdentified {
                rationale: "no achievements to analyze".to_string(),
            };
        }

        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: 64,
            temperature: 0.0,
            messages: vec![Message {
                role: "user".to_string(),
                content: build_prompt(game_title, achievements, guide_excerpts),
            }],
            system: Some(SYSTEM_PROMPT.to_string()),
        };

        let outcome = match self.request_reply(&request).await {
            Ok(reply) => interpret_reply(&reply, achievements),
            Err(message) => Classification::Error(message),
        };

        tracing::info!(game = game_title, model = %self.model, outcome = ?outcome, "Classified achievements");
        outcome
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn build_prompt(game_title: &str, achievements: &[Achievement], guide_excerpts: &[String]) -> String {
    let achievement_lines = achievements
        .iter()
        .map(|a| {
            let mut line = format!(
                "- {}: {}",
                a.name,
                a.description.as_deref().unwrap_or("No description")
            );
            if let Some(rate) = a.completion_rate {
                line.push_str(&format!(" (global completion {:.2}%)", rate));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut sections = vec![
        format!("Game title: {}", game_title),
        "Achievements:".to_string(),
        achievement_lines,
    ];

    if let Some(guide) = guide_excerpts
        .iter()
        .map(|g| g.trim())
        .find(|g| !g.is_empty())
    {
        sections.push("Guide content (first guide only):".to_string());
        sections.push(truncate_chars(guide, MAX_GUIDE_CHARS).to_string());
    }

    sections.join("\n\n")
}

/// Map the model's reply onto a stored achievement.
fn interpret_reply(reply: &str, achievements: &[Achievement]) -> Classification {
    let answer = reply
        .lines()
        .map(|l| l.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim())
        .find(|l| !l.is_empty());

    let Some(answer) = answer else {
        return Classification::Error("reasoning service returned an empty reply".to_string());
    };

    if answer.eq_ignore_ascii_case("NONE") {
        return Classification::NotIdentified {
            rationale: "model found no achievement marking main-story completion".to_string(),
        };
    }

    let matched = achievements
        .iter()
        .find(|a| a.name == answer)
        .or_else(|| achievements.iter().find(|a| a.name.eq_ignore_ascii_case(answer)));

    match matched {
        Some(achievement) => Classification::Identified {
            achievement_id: achievement.id,
            name: achievement.name.clone(),
            rationale: format!("model selected '{}'", answer),
        },
        None => Classification::NotIdentified {
            rationale: format!(
                "model suggestion '{}' did not match any stored achievement",
                answer
            ),
        },
    }
}
