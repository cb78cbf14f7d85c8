use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use voxway_gateway::config::ServerConfig;
use voxway_gateway::routes::create_voice_router;
use voxway_gateway::state::AppState;

#[derive(Parser)]
#[command(name = "voxway-gateway", about = "Real-time voice dialogue gateway")]
struct Cli {
    /// Bind address, overrides HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env().context("loading configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let cors = build_cors(&config)?;
    let address = config.address();
    let static_dir = config.static_dir.clone();

    let state = Arc::new(AppState::new(config).context("initializing providers")?);

    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(create_voice_router())
        .layer(cors)
        .with_state(state);

    if let Some(dir) = static_dir {
        let index = format!("{dir}/index.html");
        app = app.fallback_service(ServeDir::new(&dir).fallback(ServeFile::new(index)));
    }

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("listening on {address}");
    axum::serve(listener, app).await.context("server error")
}

fn build_cors(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let layer = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .cors_allowed_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .context("parsing CORS origins")?;
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };
    Ok(layer
        .allow_methods(Any)
        .allow_headers(Any))
}
