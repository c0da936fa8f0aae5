pub mod get_history;
pub mod merge_history;
pub mod populate_history;
pub mod subscribe_topic;

use get_history::GetHistoryParams;
use merge_history::MergeHistoryParams;
use populate_history::PopulateHistoryParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use std::sync::Arc;
use subscribe_topic::SubscribeTopicParams;

use chronicle::catalog::types::Level;
use chronicle::config::ChronicleConfig;
use chronicle::history::HistoryEngine;
use chronicle::timestamp::parse_timestamp;

/// The chronicle MCP tool handler. Holds the history engine and config and
/// exposes all MCP tools via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct ChronicleTools {
    tool_router: ToolRouter<Self>,
    engine: HistoryEngine,
    config: Arc<ChronicleConfig>,
}

#[tool_router]
impl ChronicleTools {
    pub fn new(engine: HistoryEngine, config: Arc<ChronicleConfig>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
            config,
        }
    }

    /// Build the initial history for a (user, topic) pair.
    #[tool(description = "Populate a user's topic history for the first time: picks up to K diverse articles published before the cutoff and sets the watermark to the cutoff. Fails if the pair is already populated.")]
    async fn populate_history(
        &self,
        Parameters(params): Parameters<PopulateHistoryParams>,
    ) -> Result<String, String> {
        let cutoff = parse_timestamp(&params.cutoff).map_err(|e| e.to_string())?;

        tracing::info!(
            user = %params.user_id,
            topic = %params.topic,
            %cutoff,
            "populate_history called"
        );

        let outcome = self
            .engine
            .populate_history(params.user_id, params.topic, cutoff)
            .await
            .map_err(|e| format!("populate failed: {e}"))?;

        serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Merge newly published articles into an existing history.
    #[tool(description = "Merge articles published since the last watermark (up to as_of) into a populated history, keeping at most K articles chosen for topical diversity.")]
    async fn merge_history(
        &self,
        Parameters(params): Parameters<MergeHistoryParams>,
    ) -> Result<String, String> {
        let as_of = parse_timestamp(&params.as_of).map_err(|e| e.to_string())?;

        tracing::info!(
            user = %params.user_id,
            topic = %params.topic,
            %as_of,
            "merge_history called"
        );

        let outcome = self
            .engine
            .merge_history(params.user_id, params.topic, as_of)
            .await
            .map_err(|e| format!("merge failed: {e}"))?;

        serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))
    }

    #[tool(description = "Read the retained articles of a user's topic history, newest first, with the current watermark. Empty if the history was never populated.")]
    async fn get_history(
        &self,
        Parameters(params): Parameters<GetHistoryParams>,
    ) -> Result<String, String> {
        tracing::debug!(user = %params.user_id, topic = %params.topic, "get_history called");

        let view = self
            .engine
            .get_history(params.user_id, params.topic)
            .await
            .map_err(|e| format!("read failed: {e}"))?;

        serde_json::to_string(&serde_json::json!({
            "user": view.user,
            "topic": view.topic,
            "watermark": view.watermark,
            "capacity": self.config.history.capacity,
            "total": view.articles.len(),
            "articles": view.articles,
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Subscribe a user to a topic so its articles become eligible.
    #[tool(description = "Subscribe a user to a topic at a level (beginner, intermediate, expert). Creates the user and topic if needed.")]
    async fn subscribe_topic(
        &self,
        Parameters(params): Parameters<SubscribeTopicParams>,
    ) -> Result<String, String> {
        let level = match &params.level {
            Some(l) => l.parse::<Level>().map_err(|e: String| e)?,
            None => Level::default(),
        };

        let result = self
            .engine
            .with_connection(move |conn| {
                chronicle::catalog::subscriptions::subscribe(conn, &params.user_id, &params.topic, level)
            })
            .await
            .map_err(|e: anyhow::Error| format!("subscribe failed: {e:#}"))?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for ChronicleTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "chronicle keeps a bounded, topically diverse reading history per user and topic. \
                 Use subscribe_topic first, populate_history once per pair, merge_history as new \
                 articles arrive, and get_history to read the result."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
