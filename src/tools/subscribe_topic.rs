//! MCP `subscribe_topic` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `subscribe_topic` MCP tool.
///
/// Creates the user and topic if they do not exist yet. Subscribing again
/// only updates the level.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SubscribeTopicParams {
    #[schemars(description = "User ID")]
    pub user_id: String,

    #[schemars(description = "Topic name")]
    pub topic: String,

    /// `"beginner"`, `"intermediate"` (default) or `"expert"`.
    #[schemars(description = "Understanding level: beginner, intermediate (default), or expert")]
    pub level: Option<String>,
}
