//! WebSocket upgrade + message loop. Each connection owns one exercise session.
//! Each client message is parsed as JSON and answered with a single JSON message.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::protocol::{exercise_request, ClientWsMessage, ServerWsMessage};
use crate::logic::*;
use crate::session::ExerciseSession;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "gapfill_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "gapfill_backend", "WebSocket connected");
  let mut session = ExerciseSession::new();
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "gapfill_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &mut session).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "gapfill_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "gapfill_backend", "WebSocket disconnected");
}

async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session: &mut ExerciseSession,
) -> ServerWsMessage {
  let msg = match msg.into_intent() {
    Ok(intent) => {
      session.apply(intent);
      return current_view(session, None);
    }
    Err(other) => other,
  };

  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Chat { messages } => {
      let reply = do_chat(state, &messages).await;
      match reply.exercise {
        Some(stored) => {
          info!(target: "exercise", id = %stored.id, "WS chat produced an exercise");
          session.load(stored.exercise);
          current_view(session, Some(stored.id))
        }
        None => ServerWsMessage::Assistant { text: reply.text },
      }
    }

    ClientWsMessage::CreateExercise { topic, language, level, num_sentences } => {
      let request = exercise_request(topic, language, level, num_sentences);
      let stored = create_exercise(state, &request).await;
      session.load(stored.exercise);
      current_view(session, Some(stored.id))
    }

    ClientWsMessage::LoadExercise { exercise } => match session.ingest(&exercise) {
      Ok(()) => current_view(session, None),
      Err(e) => ServerWsMessage::ExerciseRejected { reason: e.reason() },
    },

    ClientWsMessage::View => current_view(session, None),

    // Intents were handled above.
    ClientWsMessage::Place { .. }
    | ClientWsMessage::Clear { .. }
    | ClientWsMessage::ToggleResult
    | ClientWsMessage::Reset => current_view(session, None),
  }
}

fn current_view(session: &ExerciseSession, exercise_id: Option<String>) -> ServerWsMessage {
  match session.view() {
    Some(view) => ServerWsMessage::Exercise { exercise_id, view },
    None => ServerWsMessage::Error { message: "No exercise loaded.".into() },
  }
}
