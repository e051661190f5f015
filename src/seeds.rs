//! Seed exercises that keep the app useful without config or OpenAI.

use crate::domain::{Exercise, Item};

fn item(id: &str, sentence: &str, answer: &str) -> Item {
  Item { id: id.into(), sentence: sentence.into(), answer: answer.into() }
}

/// Built-in exercises served when the model is unavailable.
pub fn seed_exercises() -> Vec<Exercise> {
  vec![
    Exercise {
      title: "Nomen im Alltag".into(),
      instructions: "Fill each gap by dragging the correct word.".into(),
      items: vec![
        item("s1", "Der ___ ist groß.", "Hund"),
        item("s2", "Die ___ ist klein.", "Katze"),
        item("s3", "___ Haus ist alt.", "Das"),
      ],
    },
    Exercise {
      title: "Bestimmte Artikel im Nominativ".into(),
      instructions: "Drag the right definite article into each sentence.".into(),
      items: vec![
        item("s1", "___ Mann liest die Zeitung.", "Der"),
        item("s2", "___ Frau trinkt Kaffee.", "Die"),
        item("s3", "___ Kind spielt im Garten.", "Das"),
        item("s4", "___ Baum ist sehr hoch.", "Der"),
        item("s5", "___ Lampe ist kaputt.", "Die"),
        item("s6", "___ Auto ist neu.", "Das"),
      ],
    },
  ]
}

/// Absolute last resort when no other exercise is available.
pub fn hard_fallback_exercise() -> Exercise {
  Exercise {
    title: "Gap-fill warm-up".into(),
    instructions: "Fill each gap by dragging the correct word.".into(),
    items: vec![
      item("s1", "The cat sat on the ___.", "mat"),
      item("s2", "I drink ___ every morning.", "coffee"),
      item("s3", "She ___ to school by bus.", "goes"),
    ],
  }
}
