use std::sync::Arc;

use hello_mcp_server::{
    build_app,
    config::Config,
    domain::tools::builtin_registry,
    lifecycle::shutdown_signal,
    logging::{self, EventSink, TracingSink},
    mcp::dispatcher::Dispatcher,
    AppState, MCP_ENDPOINT,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    logging::init_logging(&config);

    let events: Arc<dyn EventSink> = Arc::new(TracingSink);
    let registry = Arc::new(builtin_registry(Arc::clone(&events))?);
    let dispatcher =
        Dispatcher::new(Arc::clone(&registry), events).with_call_timeout(config.call_timeout);

    let bind_socket = config.bind_socket()?;
    let state = AppState::new(dispatcher);
    let sessions = Arc::clone(&state.sessions);
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        config = %serde_json::to_string(&config)?,
        endpoint = MCP_ENDPOINT,
        tools = registry.len(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&sessions)))
        .await?;

    sessions.drained().await;
    info!("server stopped");
    Ok(())
}
