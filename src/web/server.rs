//! Axum server for the metadata query API.
//!
//! Read-only endpoints over the mirror store. Every handler runs its
//! queries on the blocking pool since the reader is synchronous.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::mirror::{MirrorReader, MirrorResult, TableSummary};

/// Application state shared across handlers.
pub struct ApiState {
    pub reader: MirrorReader,
}

/// JSON envelope of every response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>, message: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub tables: Vec<TableSummary>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub owner: Option<String>,
}

/// Build the axum router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/tables/search", get(search_tables))
        .route("/api/tables/{name}/columns", get(table_columns))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn serve(reader: MirrorReader, bind: &str) -> std::io::Result<()> {
    let state = Arc::new(ApiState { reader });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, "query API listening");

    axum::serve(listener, app).await
}

/// Run a reader call on the blocking pool.
async fn with_reader<T, F>(state: Arc<ApiState>, f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&MirrorReader) -> MirrorResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(&state.reader)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(error = %e, "mirror query failed");
            Err(internal_error(e.to_string()))
        }
        Err(e) => {
            error!(error = %e, "mirror query task failed");
            Err(internal_error(e.to_string()))
        }
    }
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::failure("internal server error", Some(message))),
    )
        .into_response()
}

async fn health(State(state): State<Arc<ApiState>>) -> Response {
    match with_reader(state, |reader| reader.ping()).await {
        Ok(()) => Json(ApiResponse {
            success: true,
            data: None::<()>,
            error: None,
            message: Some("mirror reachable".to_string()),
        })
        .into_response(),
        Err(response) => response,
    }
}

async fn table_columns(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    let name = name.trim().to_string();
    if name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("table name must not be empty", None)),
        )
            .into_response();
    }

    let lookup = name.clone();
    let detail = with_reader(state, move |reader| {
        reader.table_detail(&lookup, query.owner.as_deref())
    })
    .await;

    match detail {
        Ok(Some(detail)) => Json(ApiResponse::ok(detail)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::failure(
                format!("table {name} not found"),
                Some("check the table name or pass the right owner".to_string()),
            )),
        )
            .into_response(),
        Err(response) => response,
    }
}

async fn search_tables(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let tables = with_reader(state, move |reader| {
        reader.search(query.keyword.as_deref(), query.owner.as_deref())
    })
    .await;

    match tables {
        Ok(tables) => Json(ApiResponse::ok(SearchResult {
            count: tables.len(),
            tables,
        }))
        .into_response(),
        Err(response) => response,
    }
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::failure("no such endpoint", None)),
    )
        .into_response()
}
