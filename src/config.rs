//! Loading agent configuration (prompts + optional exercise bank) from TOML.
//!
//! See `AgentConfig` and `Prompts` for expected schema. Bank exercises use the
//! same shape as any exercise payload and go through the same validator:
//!
//! ```toml
//! [[exercises]]
//! title = "Artikel im Nominativ"
//! instructions = "Drag the right article into each gap."
//! items = [
//!   { id = "s1", sentence = "___ Hund bellt.", answer = "Der" },
//! ]
//! ```

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  /// Raw exercise payloads; validated when the state is built.
  #[serde(default)]
  pub exercises: Vec<toml::Value>,
}

/// Prompts used by the OpenAI client. Defaults target gap-fill language practice.
/// Any field can be overridden in TOML; missing ones keep their default.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Conversation
  pub assistant_system: String,
  pub exercise_tool_description: String,
  // Exercise generation
  pub exercise_system: String,
  pub exercise_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      assistant_system: "You are a helpful learning assistant. Clarify the user's learning goal, then call the create_exercise tool once you have enough information (topic, language, level, number of sentences). Keep replies concise and focused.".into(),
      exercise_tool_description: "Create a gap-fill exercise. Use when the user has specified what to learn (topic, language, level). Returns a structured exercise with sentences containing a single gap.".into(),
      exercise_system: "You are an educational content generator. Produce clean, appropriate exercises only. Make sentences short and clear. Ensure words contain all correct answers plus 2-5 plausible distractors. Respond ONLY with strict JSON.".into(),
      exercise_user_template: "Create a gap-fill exercise about \"{topic}\"{language_clause}{level_clause}. Generate {num_sentences} sentences. Each sentence must be split into 'before' and 'after' around a single missing word 'answer'. The combined pool 'words' must include all answers and a few plausible distractors from the same topic. Return JSON with fields: title, instructions, words (array of strings), sentences (array of {id, before, after, answer}).".into(),
    }
  }
}

/// Parse a TOML config document.
pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "gapfill_backend", %path, exercises = cfg.exercises.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "gapfill_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "gapfill_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_prompts_keep_defaults() {
    let cfg = parse_agent_config(
      r#"
      [prompts]
      assistant_system = "Be brief."
      "#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.assistant_system, "Be brief.");
    assert_eq!(cfg.prompts.exercise_system, Prompts::default().exercise_system);
    assert!(cfg.exercises.is_empty());
  }

  #[test]
  fn exercises_parse_as_raw_tables() {
    let cfg = parse_agent_config(
      r#"
      [[exercises]]
      title = "Artikel"
      instructions = "Fill each gap."
      items = [
        { id = "s1", sentence = "___ Hund bellt.", answer = "Der" },
      ]
      "#,
    )
    .unwrap();
    assert_eq!(cfg.exercises.len(), 1);
    let json = serde_json::to_value(&cfg.exercises[0]).unwrap();
    assert_eq!(json["items"][0]["answer"], "Der");
  }

  #[test]
  fn empty_document_is_default() {
    let cfg = parse_agent_config("").unwrap();
    assert!(cfg.exercises.is_empty());
    assert!(cfg.prompts.exercise_user_template.contains("{topic}"));
  }
}
