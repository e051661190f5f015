//! Error taxonomy of the exercise core.
//!
//! Neither core error is fatal: a rejected payload leaves the current exercise in
//! place, and a placement violation is logged and treated as a no-op.
//! `ApiError` maps what the HTTP layer can fail with onto status codes.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;

/// A malformed exercise payload, rejected at the boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("exercise payload is not a JSON object")]
  NotAnObject,

  #[error("missing or non-string field `{0}`")]
  MissingField(&'static str),

  #[error("`items` must be an array")]
  ItemsNotArray,

  #[error("`items` must not be empty")]
  EmptyItems,

  #[error("item {index}: missing or non-string field `{field}`")]
  BadItemField { index: usize, field: &'static str },

  #[error("item `{id}`: sentence has no gap marker `{marker}`")]
  MissingGapMarker { id: String, marker: &'static str },

  #[error("duplicate item id `{id}`")]
  DuplicateItemId { id: String },
}

impl ValidationError {
  /// Human-readable reason, as shown to clients.
  pub fn reason(&self) -> String {
    self.to_string()
  }
}

/// An interaction intent that references something the engine doesn't have.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlacementViolation {
  #[error("no exercise loaded")]
  NoExercise,

  #[error("unknown item id `{item_id}`")]
  UnknownItem { item_id: String },

  #[error("unknown bank key `{bank_key}`")]
  UnknownBankKey { bank_key: String },
}

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("invalid exercise: {0}")]
  InvalidExercise(#[from] ValidationError),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),
}

#[derive(Serialize)]
struct ErrorResponse {
  error: &'static str,
  message: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, error) = match &self {
      ApiError::InvalidExercise(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_exercise"),
      ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
    };
    (status, Json(ErrorResponse { error, message: self.to_string() })).into_response()
  }
}
