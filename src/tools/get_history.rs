//! MCP `get_history` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetHistoryParams {
    #[schemars(description = "User ID")]
    pub user_id: String,

    #[schemars(description = "Topic name")]
    pub topic: String,
}
