use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuideKind {
    /// External page, fetched over HTTP.
    #[default]
    Link,
    /// Raw text stored with the guide.
    Text,
}

impl GuideKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuideKind::Link => "link",
            GuideKind::Text => "text",
        }
    }
}

impl fmt::Display for GuideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuideKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "link" => Ok(GuideKind::Link),
            "text" => Ok(GuideKind::Text),
            other => Err(format!("unknown guide kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guide {
    pub id: i64,
    pub game_id: i64,
    pub title: String,
    pub kind: GuideKind,
    pub url: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewGuide {
    pub game_id: i64,
    pub title: String,
    pub kind: GuideKind,
    pub url: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
}

/// Partial update; `None` leaves the field untouched. The kind never changes.
#[derive(Debug, Clone, Default)]
pub struct GuideUpdate {
    pub title: Option<String>,
    pub url: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
}

impl GuideUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none() && self.body.is_none() && self.author.is_none()
    }

    pub fn apply_to(self, guide: &mut Guide) {
        if let Some(title) = self.title {
            guide.title = title;
        }
        if self.url.is_some() {
            guide.url = self.url;
        }
        if self.body.is_some() {
            guide.body = self.body;
        }
        if self.author.is_some() {
            guide.author = self.author;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedGuideContent {
    pub id: i64,
    pub guide_id: i64,
    pub content: String,
    pub section_count: i64,
    pub parsed_at: DateTime<Utc>,
}
