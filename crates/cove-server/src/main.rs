use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use cove_api::middleware::require_auth;
use cove_api::{AppState, AppStateInner, auth, notifications, uploads};
use cove_auth::KeyStore;
use cove_gateway::{GatewayState, connection};

#[derive(Clone)]
struct ServerState {
    app: AppState,
    gateway: GatewayState,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cove=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("COVE_DB_PATH").unwrap_or_else(|_| "cove.db".into());
    let host = std::env::var("COVE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("COVE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let key_map_path =
        std::env::var("COVE_KEY_MAP").unwrap_or_else(|_| "keys/key_map.json".into());
    let key_dir = std::env::var("COVE_KEY_DIR").unwrap_or_else(|_| "keys/private".into());
    let uploads_dir = std::env::var("COVE_UPLOADS_DIR").unwrap_or_else(|_| "uploads".into());

    // Init database
    let db = Arc::new(cove_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let keys = KeyStore::new(&key_map_path, &key_dir);
    let gateway = GatewayState::new(db.clone());
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        keys,
        uploads_dir: PathBuf::from(&uploads_dir),
    });

    let state = ServerState {
        app: app_state.clone(),
        gateway,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/users/avatar", post(uploads::upload_avatar))
        .route("/chats/{chat_id}/thumbnail", post(uploads::upload_thumbnail))
        .route("/notifications", get(notifications::list_notifications))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .nest_service("/uploads", ServeDir::new(&uploads_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Cove server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Authenticate at the HTTP upgrade: a missing or bad token is refused with
/// 401 before any WebSocket traffic flows.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.app.keys.verify(&token) {
        Ok(claims) => ws
            .on_upgrade(move |socket| {
                connection::handle_connection_authenticated(
                    socket,
                    state.gateway,
                    claims.sub,
                    claims.username,
                )
            })
            .into_response(),
        Err(err) => {
            warn!("gateway upgrade refused: {err}");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}
