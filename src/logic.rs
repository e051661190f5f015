//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - One chat turn (model pass-through with the exercise tool, or a local stub)
//!   - Exercise creation (model generation or local pool)
//!   - Opening an exercise session from a stored id or a raw payload

use tracing::{debug, error, info, instrument};

use crate::domain::{ChatTurn, ExerciseRequest, ExerciseSource, StoredExercise};
use crate::engine::ExerciseView;
use crate::error::ApiError;
use crate::openai::AssistantTurn;
use crate::session::ExerciseSession;
use crate::state::AppState;
use crate::validate::normalize;

/// Reply text plus the exercise the turn produced, if any.
pub struct ChatReply {
  pub text: String,
  pub exercise: Option<StoredExercise>,
}

#[instrument(level = "info", skip(state, messages), fields(turns = messages.len()))]
pub async fn do_chat(state: &AppState, messages: &[ChatTurn]) -> ChatReply {
  let Some(oa) = &state.openai else {
    debug!(target: "gapfill_backend", "Chat reply via stub.");
    return ChatReply { text: chat_stub(messages), exercise: None };
  };

  match oa.converse(&state.prompts, messages).await {
    Ok(AssistantTurn::Reply(text)) => ChatReply { text, exercise: None },
    Ok(AssistantTurn::CreateExercise { text, request }) => {
      let stored = create_exercise(state, &request).await;
      let text = if text.is_empty() {
        format!("Your exercise \"{}\" is ready.", stored.exercise.title)
      } else {
        text
      };
      ChatReply { text, exercise: Some(stored) }
    }
    Err(e) => {
      error!(target: "gapfill_backend", error = %e, "Chat turn failed; using stub.");
      ChatReply { text: chat_stub(messages), exercise: None }
    }
  }
}

#[instrument(level = "info", skip(state, request), fields(topic = %request.topic))]
pub async fn create_exercise(state: &AppState, request: &ExerciseRequest) -> StoredExercise {
  let (stored, origin) = state.choose_exercise(request).await;
  info!(target: "exercise", id = %stored.id, %origin, items = stored.exercise.items.len(), "Exercise created");
  stored
}

/// Open an HTTP session from a stored exercise id or a raw payload.
/// A raw payload is validated first and stored as a client exercise.
#[instrument(level = "info", skip_all, fields(exercise_id = ?exercise_id, has_payload = payload.is_some()))]
pub async fn open_session(
  state: &AppState,
  exercise_id: Option<&str>,
  payload: Option<&serde_json::Value>,
) -> Result<(String, String, ExerciseView), ApiError> {
  let stored = match (exercise_id, payload) {
    (Some(id), _) => state
      .get_exercise(id)
      .await
      .ok_or_else(|| ApiError::NotFound(format!("exercise {id}")))?,
    (None, Some(raw)) => {
      let exercise = normalize(raw)?;
      state.insert_exercise(exercise, ExerciseSource::Client).await
    }
    (None, None) => return Err(ApiError::BadRequest("either exerciseId or exercise is required".into())),
  };

  let mut session = ExerciseSession::new();
  session.load(stored.exercise);
  let view = session
    .view()
    .ok_or_else(|| ApiError::BadRequest("exercise did not load".into()))?;
  let session_id = state.open_session(&stored.id, session).await;
  info!(target: "exercise", %session_id, exercise_id = %stored.id, "Session opened");
  Ok((session_id, stored.id, view))
}

// -------- Local fallbacks --------

/// Without a model we can't hold a conversation; point the user at the direct path.
fn chat_stub(messages: &[ChatTurn]) -> String {
  let asked = messages.iter().rev().find(|t| t.role == "user").map(|t| t.content.trim());
  match asked {
    Some(q) if !q.is_empty() => format!(
      "I can't chat right now, but I can still give you a practice exercise. Ask for one about \"{}\" and I'll pick a ready-made gap-fill set.",
      q.chars().take(60).collect::<String>()
    ),
    _ => "What would you like to learn? Tell me the topic, language and level.".into(),
  }
}
