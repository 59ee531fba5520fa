use std::net::SocketAddr;
use std::path::PathBuf;
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

use redress_api::auth::{AppState, AppStateInner};
use redress_api::notify::Sink;
use redress_gateway::connection;
use redress_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redress=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("REDRESS_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("REDRESS_DB_PATH").unwrap_or_else(|_| "redress.db".into());
    let host = std::env::var("REDRESS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("REDRESS_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let notify_url = std::env::var("REDRESS_NOTIFY_URL").ok();
    let notify_from = std::env::var("REDRESS_NOTIFY_FROM")
        .unwrap_or_else(|_| "Grievance Cell <no-reply@redress.local>".into());

    // Init database
    let db = Arc::new(redress_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let sink = Sink::new(notify_url, notify_from);
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        dispatcher,
        sink,
    });

    // Routes
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(app_state.clone());

    let app = redress_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Redress server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            state.jwt_secret.clone(),
        )
    })
}
