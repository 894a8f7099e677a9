use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uvsq_agenda_core::{FetchError, calendar::google::GoogleCalendarClient, prelude::*};

/// Shared state of the handlers
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<CelcatProvider>,
    pub palette: Arc<ColorPalette>,
    pub options: SyncOptions,
}

impl AppState {
    /// `UVSQ_EDT_URL` overrides the timetable endpoint, `UVSQ_PALETTE` points
    /// to a JSON colour palette.
    pub fn from_env() -> uvsq_agenda_core::Result<Self> {
        let mut config = ProviderConfig::default();
        if let Some(url) = non_empty_var("UVSQ_EDT_URL") {
            config.base_url = url;
        }
        let palette = match non_empty_var("UVSQ_PALETTE") {
            Some(path) => {
                tracing::info!("Loading colour palette from {}", path);
                ColorPalette::from_path(path)?
            }
            None => ColorPalette::builtin().clone(),
        };
        Self::new(&config, palette)
    }

    pub fn new(config: &ProviderConfig, palette: ColorPalette) -> uvsq_agenda_core::Result<Self> {
        Ok(Self {
            provider: Arc::new(CelcatProvider::with_config(config)?),
            palette: Arc::new(palette),
            options: SyncOptions::default(),
        })
    }

    fn pipeline(&self) -> SyncPipeline<'_> {
        SyncPipeline::new(
            self.provider.as_ref(),
            self.palette.as_ref(),
            self.options.clone(),
        )
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Group and period of a timetable request
#[derive(Debug, Deserialize)]
struct ScheduleQuery {
    group: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl From<ScheduleQuery> for SyncRequest {
    fn from(query: ScheduleQuery) -> Self {
        Self {
            group_id: query.group,
            start: query.start,
            end: query.end,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/schedule", get(schedule_handler))
        .route("/sync", post(sync_handler))
        .route("/palette", get(palette_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn root_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "UVSQ Agenda Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Syncs the UVSQ Celcat timetable into Google Calendar",
        "source": {
            "name": state.provider.name(),
            "description": state.provider.description(),
            "url": state.provider.url()
        },
        "endpoints": {
            "health": "/health",
            "schedule": "/schedule",
            "sync": "/sync",
            "palette": "/palette"
        }
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn palette_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.palette.as_ref().clone())
}

/// Events a sync would create, nothing is sent
async fn schedule_handler(
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> Result<impl IntoResponse, AppError> {
    let request = SyncRequest::from(query);
    let payloads = state.pipeline().preview(&request).await?;
    Ok(Json(payloads))
}

async fn sync_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ScheduleQuery>,
) -> Result<impl IntoResponse, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let request = SyncRequest::from(body);
    tracing::info!("Sync requested for group '{}'", request.group_id);

    let calendar = GoogleCalendarClient::new(token)?;
    let report = state.pipeline().run(&request, &calendar).await?;
    Ok(Json(report))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Application error
#[derive(Debug)]
enum AppError {
    Core(uvsq_agenda_core::Error),
    Unauthorized,
}

impl AppError {
    fn status(&self) -> (StatusCode, &'static str) {
        use uvsq_agenda_core::Error;

        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Missing bearer token"),
            Self::Core(Error::Config(_)) => (StatusCode::BAD_REQUEST, "Invalid request"),
            Self::Core(Error::Fetch(FetchError::Empty)) => {
                (StatusCode::NOT_FOUND, "No event for this group")
            }
            Self::Core(Error::Fetch(FetchError::Timeout)) => {
                (StatusCode::GATEWAY_TIMEOUT, "Timetable request timed out")
            }
            Self::Core(Error::Fetch(_)) => (StatusCode::BAD_GATEWAY, "Timetable unavailable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status();
        let message = match &self {
            Self::Core(e) => e.to_string(),
            Self::Unauthorized => "Authorization: Bearer <Google access token> is required".to_string(),
        };
        if status.is_server_error() {
            tracing::warn!("{}: {}", error_message, message);
        }

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<uvsq_agenda_core::Error>,
{
    fn from(err: E) -> Self {
        Self::Core(err.into())
    }
}
