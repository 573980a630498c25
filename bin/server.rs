// Sumo Bouts - Read API
// Serves stored bouts over HTTP with Axum

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use sumo_bouts::{
    get_basho_stats, get_bouts_for_basho, get_bouts_for_rikishi, get_rikishi, setup_database,
    BashoStat, BoutPayload, Config, RikishiId, RikishiRecord,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn err(data: T, error: String) -> Self {
        Self {
            success: false,
            data,
            error: Some(error),
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/bashos - Stored bashos with bout counts
async fn get_bashos(State(state): State<AppState>) -> impl IntoResponse {
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return internal_error(Vec::<BashoStat>::new(), "database lock poisoned".to_string()),
    };

    match get_basho_stats(&conn) {
        Ok(stats) => (StatusCode::OK, Json(ApiResponse::ok(stats))).into_response(),
        Err(e) => {
            log::error!("Error getting basho stats: {:#}", e);
            internal_error(Vec::<BashoStat>::new(), e.to_string())
        }
    }
}

/// GET /api/bashos/:basho_id/bouts - Bouts of one basho
async fn get_basho_bouts(
    State(state): State<AppState>,
    Path(basho_id): Path<String>,
) -> impl IntoResponse {
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return internal_error(Vec::<BoutPayload>::new(), "database lock poisoned".to_string()),
    };

    match get_bouts_for_basho(&conn, &basho_id) {
        Ok(bouts) => {
            let payloads: Vec<BoutPayload> = bouts.iter().map(|b| b.payload()).collect();
            (StatusCode::OK, Json(ApiResponse::ok(payloads))).into_response()
        }
        Err(e) => {
            log::error!("Error getting bouts for basho {}: {:#}", basho_id, e);
            internal_error(Vec::<BoutPayload>::new(), e.to_string())
        }
    }
}

/// GET /api/rikishi/:rikishi_id - Stored name and rank
async fn get_rikishi_details(
    State(state): State<AppState>,
    Path(rikishi_id): Path<RikishiId>,
) -> impl IntoResponse {
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return internal_error(None::<RikishiRecord>, "database lock poisoned".to_string()),
    };

    match get_rikishi(&conn, rikishi_id) {
        Ok(Some(rikishi)) => (StatusCode::OK, Json(ApiResponse::ok(Some(rikishi)))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(None::<RikishiRecord>, format!("Rikishi {} not found", rikishi_id))),
        )
            .into_response(),
        Err(e) => {
            log::error!("Error getting rikishi {}: {:#}", rikishi_id, e);
            internal_error(None::<RikishiRecord>, e.to_string())
        }
    }
}

/// GET /api/rikishi/:rikishi_id/bouts - Bouts a rikishi took part in
async fn get_rikishi_bouts(
    State(state): State<AppState>,
    Path(rikishi_id): Path<RikishiId>,
) -> impl IntoResponse {
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => return internal_error(Vec::<BoutPayload>::new(), "database lock poisoned".to_string()),
    };

    match get_bouts_for_rikishi(&conn, rikishi_id) {
        Ok(bouts) => {
            let payloads: Vec<BoutPayload> = bouts.iter().map(|b| b.payload()).collect();
            (StatusCode::OK, Json(ApiResponse::ok(payloads))).into_response()
        }
        Err(e) => {
            log::error!("Error getting bouts for rikishi {}: {:#}", rikishi_id, e);
            internal_error(Vec::<BoutPayload>::new(), e.to_string())
        }
    }
}

fn internal_error<T: Serialize>(data: T, error: String) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::err(data, error)),
    )
        .into_response()
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env()?;

    if !config.db_path.exists() {
        anyhow::bail!(
            "Database not found at {} (run `sumo-bouts ingest` first)",
            config.db_path.display()
        );
    }

    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;
    log::info!("Database opened: {}", config.db_path.display());

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/bashos", get(get_bashos))
        .route("/bashos/:basho_id/bouts", get(get_basho_bouts))
        .route("/rikishi/:rikishi_id", get(get_rikishi_details))
        .route("/rikishi/:rikishi_id/bouts", get(get_rikishi_bouts))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = std::env::var("BOUTS_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Server running on http://{}", addr);
    log::info!("   API: http://{}/api/bashos", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
