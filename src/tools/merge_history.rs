//! MCP `merge_history` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `merge_history` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MergeHistoryParams {
    #[schemars(description = "User ID")]
    pub user_id: String,

    #[schemars(description = "Topic name")]
    pub topic: String,

    /// Upper bound (inclusive) of the new-article window. Must not be before
    /// the pair's current watermark.
    #[schemars(description = "As-of timestamp (RFC 3339 or YYYY-MM-DD). Articles published after the watermark and up to this time are merged")]
    pub as_of: String,
}
