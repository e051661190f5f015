//! Minimal OpenAI client for our use-cases.
//!
//! Two calls go out to chat.completions:
//!   - a conversation turn that offers the `create_exercise` tool
//!   - a strict JSON-object call that generates the exercise itself
//! Calls are instrumented and log model names, latencies, and token usage (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};

use crate::config::Prompts;
use crate::domain::{ChatTurn, Exercise, ExerciseRequest, GAP_MARKER};
use crate::util::{fill_template, trunc_for_log};
use crate::validate::normalize;

pub const EXERCISE_TOOL: &str = "create_exercise";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

/// What the assistant did with a conversation turn.
#[derive(Debug, PartialEq)]
pub enum AssistantTurn {
  Reply(String),
  /// The model called the exercise tool. `text` is whatever it said alongside.
  CreateExercise { text: String, request: ExerciseRequest },
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// POST one chat.completions request and return the first choice's message.
  async fn complete(&self, req: &ChatCompletionRequest) -> Result<ChatMessageResp, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let res = self.client.post(&url)
      .header(USER_AGENT, "gapfill-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 300));
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    body.choices.into_iter().next()
      .map(|c| c.message)
      .ok_or_else(|| "OpenAI returned no choices".to_string())
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      tools: None,
      tool_choice: None,
    };

    let text = self.complete(&req).await?.content.unwrap_or_default();
    serde_json::from_str::<T>(&text).map_err(|e| format!("JSON parse error: {}", e))
  }

  /// One conversation turn with the exercise tool on offer.
  /// Only user/assistant turns from the client are forwarded.
  #[instrument(level = "info", skip(self, prompts, history), fields(turns = history.len(), model = %self.fast_model))]
  pub async fn converse(&self, prompts: &Prompts, history: &[ChatTurn]) -> Result<AssistantTurn, String> {
    let mut messages = vec![ChatMessageReq { role: "system".into(), content: prompts.assistant_system.clone() }];
    messages.extend(
      history
        .iter()
        .filter(|t| t.role == "user" || t.role == "assistant")
        .map(|t| ChatMessageReq { role: t.role.clone(), content: t.content.clone() }),
    );

    let req = ChatCompletionRequest {
      model: self.fast_model.clone(),
      messages,
      temperature: 0.3,
      response_format: None,
      tools: Some(vec![exercise_tool(&prompts.exercise_tool_description)]),
      tool_choice: Some("auto".into()),
    };

    let msg = self.complete(&req).await?;
    interpret_turn(msg)
  }

  /// Generate a gap-fill exercise and run it through the validator.
  #[instrument(
    level = "info",
    skip(self, prompts, request),
    fields(topic = %request.topic, model = %self.strong_model)
  )]
  pub async fn generate_exercise(
    &self,
    prompts: &Prompts,
    request: &ExerciseRequest,
  ) -> Result<Exercise, String> {
    let num = request.clamped_sentences().to_string();
    let language_clause = request.language.as_deref().map(|l| format!(" in {l}")).unwrap_or_default();
    let level_clause = request.level.as_deref().map(|l| format!(" for level {l}")).unwrap_or_default();
    let user = fill_template(
      &prompts.exercise_user_template,
      &[
        ("topic", request.topic.as_str()),
        ("language_clause", language_clause.as_str()),
        ("level_clause", level_clause.as_str()),
        ("num_sentences", num.as_str()),
      ],
    );

    let start = std::time::Instant::now();
    let result = self.chat_json::<GeneratedExercise>(&self.strong_model, &prompts.exercise_system, &user, 0.7).await;
    let elapsed = start.elapsed();

    let generated = match result {
      Ok(g) => {
        info!(?elapsed, sentences = g.sentences.len(), distractors = g.words.len(), "Model response received successfully");
        g
      }
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during exercise generation");
        return Err(format!("Model generation failed: {e}"));
      }
    };

    let exercise = normalize(&generated.into_payload())
      .map_err(|e| format!("Generated exercise rejected: {e}"))?;
    info!(title = %exercise.title, items = exercise.items.len(), "Exercise successfully generated");
    Ok(exercise)
  }
}

/// Turn the assistant message into a reply or an exercise request.
fn interpret_turn(msg: ChatMessageResp) -> Result<AssistantTurn, String> {
  let text = msg.content.unwrap_or_default().trim().to_string();
  let Some(call) = msg.tool_calls.into_iter().find(|c| c.function.name == EXERCISE_TOOL) else {
    return Ok(AssistantTurn::Reply(text));
  };
  debug!(arguments = %trunc_for_log(&call.function.arguments, 200), "Exercise tool called");
  let request: ExerciseRequest = serde_json::from_str(&call.function.arguments)
    .map_err(|e| format!("Bad {} arguments: {}", EXERCISE_TOOL, e))?;
  Ok(AssistantTurn::CreateExercise { text, request })
}

fn exercise_tool(description: &str) -> ToolDef {
  ToolDef {
    r#type: "function".into(),
    function: FunctionDef {
      name: EXERCISE_TOOL.into(),
      description: description.into(),
      parameters: json!({
        "type": "object",
        "properties": {
          "topic": { "type": "string", "description": "The learning topic and context, e.g. 'German definite and indefinite articles in nominative'" },
          "language": { "type": "string", "description": "Target language for the exercise, e.g. 'German'." },
          "level": { "type": "string", "description": "Proficiency or difficulty, e.g. 'A2' or 'beginner'." },
          "numSentences": { "type": "integer", "minimum": 3, "maximum": 12, "default": 6, "description": "Number of sentences to generate." }
        },
        "required": ["topic"]
      }),
    },
  }
}

// --- Generation output ---

#[derive(Deserialize)]
struct GeneratedExercise {
  title: String,
  instructions: String,
  // Distractors. Not part of the bank, which holds exactly one entry per answer.
  #[serde(default)]
  words: Vec<String>,
  sentences: Vec<GeneratedSentence>,
}

#[derive(Deserialize)]
struct GeneratedSentence {
  #[serde(default)]
  id: String,
  #[serde(default)]
  before: String,
  #[serde(default)]
  after: String,
  answer: String,
}

impl GeneratedExercise {
  /// Reshape into an exercise payload (`items` with gapped sentences).
  fn into_payload(self) -> Value {
    let items: Vec<Value> = self
      .sentences
      .into_iter()
      .enumerate()
      .map(|(i, s)| {
        let id = if s.id.trim().is_empty() { format!("s{}", i + 1) } else { s.id };
        json!({ "id": id, "sentence": join_around_gap(&s.before, &s.after), "answer": s.answer })
      })
      .collect();
    json!({ "title": self.title, "instructions": self.instructions, "items": items })
  }
}

/// Punctuation that attaches to the word before it.
const CLOSING_PUNCTUATION: &[char] =
  &['.', ',', ';', ':', '!', '?', ')', ']', '}', '…', '»', '」', '』', '。', '、', '！', '？'];

/// `before ___ after` with single spaces, and no space before closing punctuation.
fn join_around_gap(before: &str, after: &str) -> String {
  let before = before.trim_end();
  let after = after.trim_start();
  let mut s = String::with_capacity(before.len() + after.len() + GAP_MARKER.len() + 2);
  s.push_str(before);
  if !before.is_empty() {
    s.push(' ');
  }
  s.push_str(GAP_MARKER);
  if !after.is_empty() && !after.starts_with(CLOSING_PUNCTUATION) {
    s.push(' ');
  }
  s.push_str(after);
  s
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tools: Option<Vec<ToolDef>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tool_choice: Option<String>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }
#[derive(Serialize)]
struct ToolDef { #[serde(rename = "type")] r#type: String, function: FunctionDef }
#[derive(Serialize)]
struct FunctionDef { name: String, description: String, parameters: Value }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp {
  content: Option<String>,
  #[serde(default)] tool_calls: Vec<ToolCall>,
}
#[derive(Deserialize)]
struct ToolCall { function: FunctionCall }
#[derive(Deserialize)]
struct FunctionCall { name: String, arguments: String }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn message(v: Value) -> ChatMessageResp {
    serde_json::from_value(v).unwrap()
  }

  #[test]
  fn plain_reply_passes_text_through() {
    let turn = interpret_turn(message(json!({ "content": " Which level are you at? " }))).unwrap();
    assert_eq!(turn, AssistantTurn::Reply("Which level are you at?".into()));
  }

  #[test]
  fn tool_call_becomes_exercise_request() {
    let msg = message(json!({
      "content": null,
      "tool_calls": [{
        "id": "call_1",
        "type": "function",
        "function": {
          "name": "create_exercise",
          "arguments": "{\"topic\":\"Artikel\",\"language\":\"German\",\"numSentences\":20}"
        }
      }]
    }));
    match interpret_turn(msg).unwrap() {
      AssistantTurn::CreateExercise { text, request } => {
        assert!(text.is_empty());
        assert_eq!(request.topic, "Artikel");
        assert_eq!(request.language.as_deref(), Some("German"));
        assert_eq!(request.level, None);
        assert_eq!(request.clamped_sentences(), 12);
      }
      other => panic!("unexpected turn: {other:?}"),
    }
  }

  #[test]
  fn malformed_tool_arguments_are_an_error() {
    let msg = message(json!({
      "tool_calls": [{ "function": { "name": "create_exercise", "arguments": "{not json" } }]
    }));
    assert!(interpret_turn(msg).is_err());
  }

  #[test]
  fn gap_joins_with_normalized_spacing() {
    assert_eq!(join_around_gap("Der ", " ist groß."), "Der ___ ist groß.");
    assert_eq!(join_around_gap("Ich sehe", "."), "Ich sehe ___.");
    assert_eq!(join_around_gap("", "Haus ist alt."), "___ Haus ist alt.");
    assert_eq!(join_around_gap("Die Farbe", "(rot) passt."), "Die Farbe ___ (rot) passt.");
    assert_eq!(join_around_gap("Er sagt", "\"ja\"."), "Er sagt ___ \"ja\".");
    assert_eq!(join_around_gap("Und dann", "…"), "Und dann ___…");
    assert_eq!(join_around_gap("Sie ruft «Komm", "»!"), "Sie ruft «Komm ___»!");
    assert_eq!(join_around_gap("「これは", "」"), "「これは ___」");
  }

  #[test]
  fn generated_output_becomes_valid_exercise() {
    let gen: GeneratedExercise = serde_json::from_value(json!({
      "title": "Artikel",
      "instructions": "Fill the gaps.",
      "words": ["der", "die", "das", "den"],
      "sentences": [
        { "id": "1", "before": "", "after": "Mann liest.", "answer": "Der" },
        { "before": "Ich sehe", "after": "Frau.", "answer": "die" }
      ]
    }))
    .unwrap();
    let ex = normalize(&gen.into_payload()).unwrap();
    assert_eq!(ex.items.len(), 2);
    assert_eq!(ex.items[0].id, "1");
    assert_eq!(ex.items[0].sentence, "___ Mann liest.");
    assert_eq!(ex.items[1].id, "s2");
    assert_eq!(ex.items[1].sentence, "Ich sehe ___ Frau.");
  }

  #[test]
  fn extracts_error_message() {
    let body = r#"{"error":{"message":"Invalid API key","type":"auth"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Invalid API key"));
    assert_eq!(extract_openai_error("gateway timeout"), None);
  }
}
