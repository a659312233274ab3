//! MCP Tool Server
//!
//! Serves registered tools, resources and prompts to MCP clients over stdio,
//! SSE or streamable HTTP.

use clap::Parser;
use std::sync::Arc;
use tracing::info;

use mcp_tool_server::config::{Args, Config};
use mcp_tool_server::error::Result;
use mcp_tool_server::http::{self, HttpState};
use mcp_tool_server::logging::{self, LevelControl};
use mcp_tool_server::mcp::{
    run_stdio, CapabilityServer, Dispatcher, LegacyAdapter, MethodHandler, ToolRegistry,
};
use mcp_tool_server::metrics::Metrics;
use mcp_tool_server::tools;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Build configuration from args
    let config: Config = args.into();
    let log_handle = logging::init(config.verbosity)?;
    config.validate()?;

    info!("{} v{}", config.name, config.version);
    info!("Transport: {:?}", config.transport);

    let registry = Arc::new(ToolRegistry::new());
    let count = tools::register_all_tools(&registry).await?;
    info!("Registered {} tools", count);

    let metrics = Metrics::new();
    let info = config.server_info();
    let log_control: Arc<dyn LevelControl> = Arc::new(log_handle);

    let mut builder = CapabilityServer::builder(registry.clone(), info.clone())
        .metrics(metrics.clone())
        .log_control(log_control);
    if let Some(catalog) = &config.catalog {
        builder = builder.catalog(catalog);
    }

    let handler: Arc<dyn MethodHandler> = if config.legacy {
        Arc::new(LegacyAdapter::connect(registry, info.clone(), builder.build()).await)
    } else {
        Arc::new(builder.build().await?)
    };

    if config.transport.is_http() {
        let state = HttpState::new(handler, info, metrics, config.sse_paths());
        http::start_server(&config, state).await?;
    } else {
        info!("Starting stdio transport...");
        let dispatcher = Dispatcher::with_metrics(handler, metrics);
        let reason = run_stdio(&dispatcher).await?;
        info!("Stdio transport stopped: {:?}", reason);
    }

    Ok(())
}
