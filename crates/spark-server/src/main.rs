mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use spark_api::AppStateInner;
use spark_chat::backend::LocalBackend;
use spark_gateway::connection;
use spark_gateway::dispatcher::Dispatcher;

use crate::config::ServerConfig;

/// Log filter used when `RUST_LOG` is unset. Targets without a directive are off.
const DEFAULT_LOG_FILTER: &str =
    "spark=debug,spark_api=debug,spark_chat=debug,spark_db=debug,spark_gateway=debug,tower_http=debug";

#[derive(Clone)]
struct GatewayState {
    backend: LocalBackend,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = spark_db::Database::open(&config.db_path)?;
    let backend = LocalBackend::new(Arc::new(db), Dispatcher::new());

    let app_state = AppStateInner::new(
        backend.clone(),
        config.jwt_secret.clone(),
        config.page_size,
        config.max_page_size,
    );

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            backend,
            jwt_secret: config.jwt_secret.clone(),
        });

    let app = spark_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Spark server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let dispatcher = state.backend.dispatcher().clone();
        connection::handle_connection(
            socket,
            dispatcher,
            state.jwt_secret,
            Arc::new(state.backend),
        )
    })
}
