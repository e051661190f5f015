//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::domain::ExerciseRequest;
use crate::error::ApiError;
use crate::protocol::*;
use crate::session::Intent;
use crate::state::AppState;
use crate::logic::*;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(turns = body.messages.len()))]
pub async fn http_post_chat(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChatIn>,
) -> impl IntoResponse {
  let reply = do_chat(&state, &body.messages).await;
  info!(target: "gapfill_backend", has_exercise = reply.exercise.is_some(), "HTTP chat turn served");
  Json(ChatOut { text: reply.text, exercise: reply.exercise.as_ref().map(to_out) })
}

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic))]
pub async fn http_post_exercise(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExerciseRequest>,
) -> impl IntoResponse {
  let stored = create_exercise(&state, &body).await;
  info!(target: "exercise", id = %stored.id, "HTTP exercise served");
  Json(to_out(&stored))
}

#[instrument(level = "info", skip(state, body), fields(exercise_id = ?body.exercise_id, has_payload = body.exercise.is_some()))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> Result<Json<SessionOut>, ApiError> {
  let (session_id, exercise_id, view) =
    open_session(&state, body.exercise_id.as_deref(), body.exercise.as_ref()).await?;
  Ok(Json(SessionOut { session_id, exercise_id, view }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let view = state
    .session_view(&id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
  Ok(Json(view))
}

#[instrument(level = "info", skip(state, intent), fields(?intent))]
pub async fn http_post_intent(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(intent): Json<Intent>,
) -> Result<impl IntoResponse, ApiError> {
  let view = state
    .apply_intent(&id, intent)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
  Ok(Json(view))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  if state.close_session(&id).await {
    info!(target: "exercise", session_id = %id, "Session closed");
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("session {id}")))
  }
}
