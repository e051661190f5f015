//! One exercise view: owns a single match engine, ingests raw payloads
//! through the validator, and applies interaction intents.
//!
//! A rejected payload never touches the loaded exercise. Intents that the
//! engine refuses are logged and dropped; drag layers routinely send stale or
//! duplicate events, so they are never an error for the client.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::Exercise;
use crate::engine::{ExerciseView, MatchEngine};
use crate::error::ValidationError;
use crate::validate::normalize;

/// Mutation intents emitted by the interaction layer.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
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
}

#[derive(Debug, Default)]
pub struct ExerciseSession {
  engine: MatchEngine,
}

impl ExerciseSession {
  pub fn new() -> Self {
    Self::default()
  }

  /// Validate `raw` and load it, replacing the current exercise.
  /// On rejection the current exercise stays as it was.
  pub fn ingest(&mut self, raw: &Value) -> Result<(), ValidationError> {
    match normalize(raw) {
      Ok(exercise) => {
        self.load(exercise);
        Ok(())
      }
      Err(e) => {
        warn!(target: "exercise", reason = %e, "Exercise payload rejected; keeping current exercise");
        Err(e)
      }
    }
  }

  /// Load an already validated exercise.
  pub fn load(&mut self, exercise: Exercise) {
    info!(target: "exercise", title = %exercise.title, items = exercise.items.len(), "Exercise session loaded");
    self.engine.load_exercise(exercise);
  }

  /// Apply one intent. Returns the view after the intent, if loaded.
  pub fn apply(&mut self, intent: Intent) -> Option<ExerciseView> {
    let outcome = match &intent {
      Intent::Place { item_id, bank_key } => self.engine.place(item_id, bank_key),
      Intent::Clear { item_id } => self.engine.clear(item_id),
      Intent::ToggleResult => {
        let visible = self.engine.toggle_show_result();
        info!(target: "exercise", %visible, "Result visibility toggled");
        Ok(())
      }
      Intent::Reset => {
        self.engine.reset();
        Ok(())
      }
    };
    if let Err(violation) = outcome {
      warn!(target: "exercise", ?intent, %violation, "Ignoring intent");
    }
    self.engine.view()
  }

  pub fn view(&self) -> Option<ExerciseView> {
    self.engine.view()
  }

  #[allow(dead_code)]
  pub fn engine(&self) -> &MatchEngine {
    &self.engine
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::Phase;
  use serde_json::json;

  fn payload() -> Value {
    json!({
      "title": "Nomen",
      "instructions": "Fill each gap.",
      "items": [
        { "id": "s1", "sentence": "Der ___ ist groß.", "answer": "Hund" },
        { "id": "s2", "sentence": "Die ___ ist klein.", "answer": "Katze" }
      ]
    })
  }

  fn key_of(session: &ExerciseSession, word: &str) -> String {
    session.engine().bank().iter().find(|b| b.word == word).unwrap().key.clone()
  }

  #[test]
  fn intents_deserialize_from_tagged_json() {
    let place: Intent =
      serde_json::from_value(json!({ "type": "place", "itemId": "s1", "bankKey": "Hund#0" })).unwrap();
    assert_eq!(place, Intent::Place { item_id: "s1".into(), bank_key: "Hund#0".into() });
    let toggle: Intent = serde_json::from_value(json!({ "type": "toggle_result" })).unwrap();
    assert_eq!(toggle, Intent::ToggleResult);
  }

  #[test]
  fn ingest_loads_valid_payload() {
    let mut session = ExerciseSession::new();
    assert!(session.view().is_none());
    session.ingest(&payload()).unwrap();
    let view = session.view().unwrap();
    assert_eq!(view.title, "Nomen");
    assert_eq!(view.phase, Phase::Loaded);
    assert_eq!(view.available.len(), 2);
  }

  #[test]
  fn rejected_payload_keeps_current_exercise() {
    let mut session = ExerciseSession::new();
    session.ingest(&payload()).unwrap();
    let hund = key_of(&session, "Hund");
    session.apply(Intent::Place { item_id: "s1".into(), bank_key: hund.clone() });

    let err = session.ingest(&json!({ "title": "Broken", "items": [] })).unwrap_err();
    assert_eq!(err, ValidationError::MissingField("instructions"));

    let view = session.view().unwrap();
    assert_eq!(view.title, "Nomen");
    assert_eq!(view.items[0].placed_key.as_deref(), Some(hund.as_str()));
  }

  #[test]
  fn bad_intents_are_noops() {
    let mut session = ExerciseSession::new();
    assert!(session.apply(Intent::Clear { item_id: "s1".into() }).is_none());

    session.ingest(&payload()).unwrap();
    let before = session.view();
    let after = session.apply(Intent::Place { item_id: "s9".into(), bank_key: "Hund#0".into() });
    assert_eq!(before, after);
  }

  #[test]
  fn full_round_through_intents() {
    let mut session = ExerciseSession::new();
    session.ingest(&payload()).unwrap();
    let hund = key_of(&session, "Hund");
    let katze = key_of(&session, "Katze");

    session.apply(Intent::Place { item_id: "s1".into(), bank_key: katze.clone() });
    session.apply(Intent::Place { item_id: "s2".into(), bank_key: hund.clone() });
    let view = session.apply(Intent::ToggleResult).unwrap();
    assert_eq!(view.phase, Phase::FullyPlaced);
    assert_eq!(view.items[0].correct, Some(false));
    assert_eq!(view.items[1].correct, Some(false));

    let view = session.apply(Intent::Reset).unwrap();
    assert_eq!(view.phase, Phase::Loaded);
    assert!(!view.show_result);

    session.apply(Intent::Place { item_id: "s1".into(), bank_key: hund });
    session.apply(Intent::Place { item_id: "s2".into(), bank_key: katze });
    let view = session.apply(Intent::ToggleResult).unwrap();
    assert!(view.items.iter().all(|i| i.correct == Some(true)));
  }
}
