//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that wire up the
//! database, the history engine, and the MCP tool handler into a running
//! server.

use crate::tools::ChronicleTools;
use anyhow::Result;
use chronicle::config::ChronicleConfig;
use chronicle::db;
use chronicle::history::{HistoryEngine, HistoryMerger};
use rmcp::ServiceExt;
use std::sync::Arc;

/// Shared setup: prepare the DB, check the stored embedding dimension, build
/// the engine. Returns (engine, config) ready for sharing.
fn setup_shared_state(config: ChronicleConfig) -> Result<(HistoryEngine, Arc<ChronicleConfig>)> {
    let db_path = config.resolved_db_path();
    let engine = HistoryEngine::open(
        &db_path,
        config.storage.busy_timeout(),
        HistoryMerger::new(&config.history),
    )?;
    tracing::info!(db = %db_path.display(), "database ready");

    let conn = db::connect(&db_path, config.storage.busy_timeout())?;
    if let Ok(Some(stored)) = db::migrations::get_embedding_dimension(&conn) {
        if stored != config.embedding.dimension {
            tracing::warn!(
                stored,
                configured = config.embedding.dimension,
                "embedding dimension differs from the database; imports will be rejected"
            );
        }
    }

    tracing::info!(capacity = engine.capacity(), "history engine ready");

    Ok((engine, Arc::new(config)))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: ChronicleConfig) -> Result<()> {
    tracing::info!("starting chronicle MCP server on stdio");

    let (engine, config) = setup_shared_state(config)?;

    let tools = ChronicleTools::new(engine, config);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: ChronicleConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting chronicle MCP server on HTTP");

    let (engine, config) = setup_shared_state(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(ChronicleTools::new(engine.clone(), config.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
