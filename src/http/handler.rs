//! Axum router and request handlers for the passthrough API.
//!
//! Routes:
//! - `GET /`           - Welcome message
//! - `GET /champs`     - Champion data
//! - `GET /items`      - Item data
//! - `GET /spells`     - Summoner spell data
//! - `GET /maps`       - Map data
//! - `GET /masteries`  - Mastery data
//! - `GET /versions`   - Realm (version) metadata, served whole

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{error, instrument};

use crate::http::access_log;
use crate::models::error::FetchError;
use crate::models::resource::Resource;
use crate::services::passthrough::{served_view, PassthroughService};

pub const WELCOME_MESSAGE: &str = "Welcome to the LoL Static Data Passthrough API.";

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PassthroughService>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all routes and the access-log layer.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().route("/", get(handle_welcome));
    for resource in Resource::ALL {
        router = router.route(
            resource.route(),
            get(move |State(state): State<AppState>| async move {
                handle_resource(state, resource).await
            }),
        );
    }
    router
        .layer(middleware::from_fn(access_log::log_request))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_welcome() -> Json<serde_json::Value> {
    Json(json!({ "message": WELCOME_MESSAGE }))
}

#[instrument(skip(state))]
async fn handle_resource(state: AppState, resource: Resource) -> Result<Response, AppError> {
    let payload = state.service.fetch(resource).await?;
    let body = served_view(resource, &payload)?;
    Ok(Json(body).into_response())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A failed upstream read, answered with `502 Bad Gateway`.
#[derive(Debug)]
pub struct AppError(FetchError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "upstream fetch failed");
        let status_code = match &self.0 {
            FetchError::Upstream { status_code, .. } => Some(*status_code),
            FetchError::Transport(_) | FetchError::Malformed(_) => None,
        };
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": {
                    "kind": self.0.kind(),
                    "message": self.0.to_string(),
                    "status_code": status_code,
                }
            })),
        )
            .into_response()
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError(err)
    }
}
