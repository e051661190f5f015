//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ChatTurn, ExerciseRequest, ExerciseSource, Item, StoredExercise};
use crate::engine::ExerciseView;
use crate::session::Intent;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Chat {
        messages: Vec<ChatTurn>,
    },
    CreateExercise {
        topic: String,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        level: Option<String>,
        #[serde(default, rename = "numSentences")]
        num_sentences: Option<u32>,
    },
    /// Raw exercise payload; validated before it replaces the current one.
    LoadExercise {
        exercise: Value,
    },
    Place {
        #[serde(rename = "itemId")]
        item_id: String,
        #[serde(rename = "bankKey")]
        bank_key: String,
    },
    Clear {
        #[serde(rename = "itemId")]
        item_id: String,
    },
    ToggleResult,
    Reset,
    View,
}

impl ClientWsMessage {
    /// The engine intent carried by this message, if it is one.
    pub fn into_intent(self) -> Result<Intent, Self> {
        match self {
            ClientWsMessage::Place { item_id, bank_key } => Ok(Intent::Place { item_id, bank_key }),
            ClientWsMessage::Clear { item_id } => Ok(Intent::Clear { item_id }),
            ClientWsMessage::ToggleResult => Ok(Intent::ToggleResult),
            ClientWsMessage::Reset => Ok(Intent::Reset),
            other => Err(other),
        }
    }
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Assistant {
        text: String,
    },
    Exercise {
        #[serde(rename = "exerciseId", skip_serializing_if = "Option::is_none")]
        exercise_id: Option<String>,
        view: ExerciseView,
    },
    ExerciseRejected {
        reason: String,
    },
    Error {
        message: String,
    },
}

/// DTO used by both WS and HTTP for exercise delivery.
#[derive(Debug, Serialize)]
pub struct ExerciseOut {
    pub id: String,
    pub source: ExerciseSource,
    pub title: String,
    pub instructions: String,
    pub items: Vec<Item>,
}

/// Convert a stored exercise to the public DTO.
pub fn to_out(s: &StoredExercise) -> ExerciseOut {
    ExerciseOut {
        id: s.id.clone(),
        source: s.source.clone(),
        title: s.exercise.title.clone(),
        instructions: s.exercise.instructions.clone(),
        items: s.exercise.items.clone(),
    }
}

/// Build the tool arguments from WS `create_exercise` fields.
pub fn exercise_request(
    topic: String,
    language: Option<String>,
    level: Option<String>,
    num_sentences: Option<u32>,
) -> ExerciseRequest {
    ExerciseRequest { topic, language, level, num_sentences: num_sentences.unwrap_or(6) }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct ChatIn {
    pub messages: Vec<ChatTurn>,
}
#[derive(Serialize)]
pub struct ChatOut {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise: Option<ExerciseOut>,
}

#[derive(Debug, Deserialize)]
pub struct SessionIn {
    #[serde(default, rename = "exerciseId")]
    pub exercise_id: Option<String>,
    #[serde(default)]
    pub exercise: Option<Value>,
}
#[derive(Serialize)]
pub struct SessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "exerciseId")]
    pub exercise_id: String,
    pub view: ExerciseView,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
