//! Catalog record types: articles as they arrive from the loader, and
//! user subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How well a user already knows a subscribed topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Beginner,
    #[default]
    Intermediate,
    Expert,
}

impl Level {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Expert => "expert",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "expert" => Ok(Self::Expert),
            _ => Err(format!("unknown level: {s}")),
        }
    }
}

/// An article to ingest, one per line of an import file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    /// Canonical link; the article's stable identity.
    pub link: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub pub_date: DateTime<Utc>,
    /// Source feed the article came from.
    #[serde(default)]
    pub channel: Option<String>,
    /// Topic names the article is related to.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Precomputed embedding of `title + description`.
    pub embedding: Vec<f32>,
}

/// A user's subscription to a topic.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub user_id: String,
    pub topic: String,
    pub level: Level,
    pub created_at: String,
}
