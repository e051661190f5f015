//! Domain models: exercises, their items, and where an exercise came from.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Token marking the gap inside an item sentence.
pub const GAP_MARKER: &str = "___";

/// Where did we get the exercise from?
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseSource {
  Generated,   // produced by the model through the exercise tool
  LocalBank,   // from user-provided TOML bank
  Seed,        // built-in seeds (last resort)
  Client,      // posted by a client as a raw payload
}

/// One gap-fill sentence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
  pub id: String,
  pub sentence: String,
  pub answer: String,
}

impl Item {
  /// Split the sentence around the first gap marker. Anything after the first
  /// marker, further markers included, belongs to the tail.
  pub fn fragments(&self) -> (&str, &str) {
    match self.sentence.split_once(GAP_MARKER) {
      Some((before, after)) => (before, after),
      None => (self.sentence.as_str(), ""),
    }
  }
}

/// A validated exercise. Immutable once loaded into an engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exercise {
  pub title: String,
  pub instructions: String,
  pub items: Vec<Item>,
}

/// Arguments of the exercise tool, also accepted directly over HTTP/WS.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExerciseRequest {
  pub topic: String,
  #[serde(default)] pub language: Option<String>,
  #[serde(default)] pub level: Option<String>,
  #[serde(default = "default_num_sentences", rename = "numSentences")]
  pub num_sentences: u32,
}

fn default_num_sentences() -> u32 { 6 }

impl ExerciseRequest {
  /// Requested sentence count, kept within 3..=12.
  pub fn clamped_sentences(&self) -> u32 {
    self.num_sentences.clamp(3, 12)
  }
}

/// One message of the client-held conversation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
  pub role: String,   // "user" | "assistant"
  pub content: String,
}

/// An exercise as kept in the in-memory store.
#[derive(Clone, Debug)]
pub struct StoredExercise {
  pub id: String,
  pub source: ExerciseSource,
  pub exercise: Exercise,
  pub stored_at: Instant,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(sentence: &str) -> Item {
    Item { id: "s1".into(), sentence: sentence.into(), answer: "x".into() }
  }

  #[test]
  fn fragments_split_on_first_marker() {
    assert_eq!(item("Der ___ ist groß.").fragments(), ("Der ", " ist groß."));
    assert_eq!(item("___ Haus ist alt.").fragments(), ("", " Haus ist alt."));
    assert_eq!(item("a ___ b ___ c").fragments(), ("a ", " b ___ c"));
  }

  #[test]
  fn exercise_request_defaults_and_clamps() {
    let r: ExerciseRequest = serde_json::from_str(r#"{"topic":"Artikel"}"#).unwrap();
    assert_eq!(r.num_sentences, 6);
    assert_eq!(r.clamped_sentences(), 6);
    let r: ExerciseRequest = serde_json::from_str(r#"{"topic":"x","numSentences":1}"#).unwrap();
    assert_eq!(r.clamped_sentences(), 3);
  }

  #[test]
  fn fragments_without_marker_keep_whole_sentence() {
    assert_eq!(item("no gap").fragments(), ("no gap", ""));
  }
}
