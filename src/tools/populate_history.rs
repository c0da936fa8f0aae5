//! MCP `populate_history` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `populate_history` MCP tool.
///
/// Builds the first history for a (user, topic) pair from every eligible
/// article published strictly before `cutoff`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PopulateHistoryParams {
    #[schemars(description = "User ID")]
    pub user_id: String,

    #[schemars(description = "Topic name the user is subscribed to")]
    pub topic: String,

    /// RFC 3339 timestamp or `YYYY-MM-DD`; becomes the pair's watermark.
    #[schemars(description = "Cutoff timestamp (RFC 3339 or YYYY-MM-DD). Articles published before it are considered")]
    pub cutoff: String,
}
