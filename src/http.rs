//! JSON-over-HTTP surface. One route per coordinator action; clients poll the
//! state route to follow a game. The caller's identity arrives in the
//! `x-player-id` header, set by an authenticating proxy in front of us.

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use crate::coordinator::MatchCoordinator;
use crate::record::{Match, Move, PlayerId};
use crate::result::{CreatedMatch, MatchError, MoveOutcome, RematchOutcome};

pub const PLAYER_HEADER: &str = "x-player-id";

#[derive(Clone)]
pub struct AppState {
    pub coordinator: MatchCoordinator,
}

/// The authenticated player making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub PlayerId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PLAYER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<PlayerId>().ok())
            .map(Caller)
            .ok_or(ApiError {
                status: StatusCode::UNAUTHORIZED,
                body: ErrorResponse {
                    error: format!("Error: Missing or malformed {} header.", PLAYER_HEADER),
                    kind: "unauthenticated",
                },
            })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomRequest {
    pub room_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveRequest {
    pub room_code: String,
    #[serde(alias = "y")]
    pub row: u8,
    #[serde(alias = "x")]
    pub col: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveHistoryResponse {
    pub room_code: String,
    pub moves: Vec<Move>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl From<MatchError> for ApiError {
    fn from(err: MatchError) -> Self {
        let status = match &err {
            MatchError::NotFound(_) => StatusCode::NOT_FOUND,
            MatchError::Conflict(_) | MatchError::ActiveSessionConflict(_) => StatusCode::CONFLICT,
            MatchError::TurnViolation | MatchError::Forbidden => StatusCode::FORBIDDEN,
            MatchError::CellOccupied { .. } | MatchError::InvalidState(_) | MatchError::OutOfBounds { .. } => {
                StatusCode::BAD_REQUEST
            }
            MatchError::RoomCodesExhausted => StatusCode::SERVICE_UNAVAILABLE,
            MatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        ApiError {
            status,
            body: ErrorResponse { error: err.to_string(), kind: err.kind() },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Coordinator actions block on room locks, so they run off the async workers.
async fn run<T, F>(state: &AppState, action: F) -> Result<T, ApiError>
where
    F: FnOnce(&MatchCoordinator) -> Result<T, MatchError> + Send + 'static,
    T: Send + 'static,
{
    let coordinator = state.coordinator.clone();
    let joined = tokio::task::spawn_blocking(move || action(&coordinator)).await;
    match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => {
            tracing::error!(error = %err, "coordinator task failed");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: ErrorResponse { error: "Error: Internal failure.".to_string(), kind: "internal" },
            })
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            HeaderName::from_static(PLAYER_HEADER),
        ])
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/games", post(create_match))
        .route("/api/games/join", post(join_match))
        .route("/api/games/move", post(apply_move))
        .route("/api/games/cancel", post(cancel_match))
        .route("/api/games/rematch", post(rematch))
        .route("/api/games/leave", post(leave))
        .route("/api/games/{room_code}", get(get_state))
        .route("/api/games/{room_code}/moves", get(move_history))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "pong",
        "status": "server is running"
    }))
}

async fn create_match(
    State(state): State<AppState>,
    Caller(player): Caller,
) -> Result<(StatusCode, Json<CreatedMatch>), ApiError> {
    let created = run(&state, move |c| c.create_match(player)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn join_match(
    State(state): State<AppState>,
    Caller(player): Caller,
    Json(request): Json<RoomRequest>,
) -> Result<Json<Match>, ApiError> {
    run(&state, move |c| c.join_match(&request.room_code, player)).await.map(Json)
}

async fn apply_move(
    State(state): State<AppState>,
    Caller(player): Caller,
    Json(request): Json<MoveRequest>,
) -> Result<Json<MoveOutcome>, ApiError> {
    run(&state, move |c| c.apply_move(&request.room_code, player, request.row, request.col))
        .await
        .map(Json)
}

async fn cancel_match(
    State(state): State<AppState>,
    Caller(player): Caller,
    Json(request): Json<RoomRequest>,
) -> Result<StatusCode, ApiError> {
    run(&state, move |c| c.cancel_match(&request.room_code, player)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rematch(
    State(state): State<AppState>,
    Caller(player): Caller,
    Json(request): Json<RoomRequest>,
) -> Result<Json<RematchOutcome>, ApiError> {
    run(&state, move |c| c.rematch(&request.room_code, player)).await.map(Json)
}

async fn leave(
    State(state): State<AppState>,
    Caller(player): Caller,
    Json(request): Json<RoomRequest>,
) -> Result<Json<Match>, ApiError> {
    run(&state, move |c| c.leave(&request.room_code, player)).await.map(Json)
}

async fn get_state(
    State(state): State<AppState>,
    Path(room_code): Path<String>,
) -> Result<Json<Match>, ApiError> {
    run(&state, move |c| c.get_state(&room_code)).await.map(Json)
}

async fn move_history(
    State(state): State<AppState>,
    Path(room_code): Path<String>,
) -> Result<Json<MoveHistoryResponse>, ApiError> {
    let lookup = room_code.clone();
    let moves = run(&state, move |c| c.move_history(&lookup)).await?;
    Ok(Json(MoveHistoryResponse { room_code, moves }))
}
