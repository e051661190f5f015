//! Shape check for untyped exercise payloads.
//!
//! The validator trusts nothing about the payload's shape but everything about
//! its pedagogy: it checks that the fields are there and that every sentence
//! has a gap, then hands the exercise through unchanged.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::domain::{Exercise, Item, GAP_MARKER};
use crate::error::ValidationError;

/// Validate a raw payload and return it as an `Exercise`.
/// Item order and content are preserved; unknown extra fields are ignored.
pub fn normalize(raw: &Value) -> Result<Exercise, ValidationError> {
  let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;

  let title = str_field(obj, "title").ok_or(ValidationError::MissingField("title"))?;
  let instructions =
    str_field(obj, "instructions").ok_or(ValidationError::MissingField("instructions"))?;

  let raw_items = match obj.get("items") {
    None => return Err(ValidationError::MissingField("items")),
    Some(v) => v.as_array().ok_or(ValidationError::ItemsNotArray)?,
  };
  if raw_items.is_empty() {
    return Err(ValidationError::EmptyItems);
  }

  let mut seen = HashSet::new();
  let mut items = Vec::with_capacity(raw_items.len());
  for (index, raw_item) in raw_items.iter().enumerate() {
    let item = normalize_item(index, raw_item)?;
    if !seen.insert(item.id.clone()) {
      return Err(ValidationError::DuplicateItemId { id: item.id });
    }
    items.push(item);
  }

  Ok(Exercise { title: title.to_string(), instructions: instructions.to_string(), items })
}

fn normalize_item(index: usize, raw: &Value) -> Result<Item, ValidationError> {
  let obj = raw
    .as_object()
    .ok_or(ValidationError::BadItemField { index, field: "id" })?;
  let field = |name: &'static str| {
    str_field(obj, name).ok_or(ValidationError::BadItemField { index, field: name })
  };

  let id = field("id")?;
  let sentence = field("sentence")?;
  let answer = field("answer")?;

  if !sentence.contains(GAP_MARKER) {
    return Err(ValidationError::MissingGapMarker { id: id.to_string(), marker: GAP_MARKER });
  }

  Ok(Item { id: id.to_string(), sentence: sentence.to_string(), answer: answer.to_string() })
}

fn str_field<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
  obj.get(name).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn sample() -> Value {
    json!({
      "title": "Artikel",
      "instructions": "Fill each gap.",
      "items": [
        { "id": "s1", "sentence": "Der ___ ist groß.", "answer": "Hund" },
        { "id": "s2", "sentence": "___ Haus ist alt.", "answer": "Das", "hint": "ignored" }
      ]
    })
  }

  #[test]
  fn accepts_well_formed_payload_unchanged() {
    let ex = normalize(&sample()).unwrap();
    assert_eq!(ex.title, "Artikel");
    assert_eq!(ex.instructions, "Fill each gap.");
    let ids: Vec<&str> = ex.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["s1", "s2"]);
    assert_eq!(ex.items[0].sentence, "Der ___ ist groß.");
    assert_eq!(ex.items[1].answer, "Das");
  }

  #[test]
  fn rejects_non_object() {
    assert_eq!(normalize(&json!([1, 2])), Err(ValidationError::NotAnObject));
    assert_eq!(normalize(&json!("x")), Err(ValidationError::NotAnObject));
  }

  #[test]
  fn rejects_missing_or_non_string_header_fields() {
    let mut v = sample();
    v["title"] = json!(3);
    assert_eq!(normalize(&v), Err(ValidationError::MissingField("title")));

    let mut v = sample();
    v.as_object_mut().unwrap().remove("instructions");
    assert_eq!(normalize(&v), Err(ValidationError::MissingField("instructions")));

    let mut v = sample();
    v.as_object_mut().unwrap().remove("items");
    assert_eq!(normalize(&v), Err(ValidationError::MissingField("items")));
  }

  #[test]
  fn rejects_empty_or_non_array_items() {
    let mut v = sample();
    v["items"] = json!([]);
    assert_eq!(normalize(&v), Err(ValidationError::EmptyItems));

    v["items"] = json!({ "id": "s1" });
    assert_eq!(normalize(&v), Err(ValidationError::ItemsNotArray));
  }

  #[test]
  fn rejects_bad_item_fields() {
    let mut v = sample();
    v["items"][1]["answer"] = Value::Null;
    assert_eq!(
      normalize(&v),
      Err(ValidationError::BadItemField { index: 1, field: "answer" })
    );

    let mut v = sample();
    v["items"][0] = json!("not an item");
    assert!(matches!(normalize(&v), Err(ValidationError::BadItemField { index: 0, .. })));
  }

  #[test]
  fn rejects_sentence_without_gap() {
    let mut v = sample();
    v["items"][0]["sentence"] = json!("Der Hund ist groß.");
    let err = normalize(&v).unwrap_err();
    assert_eq!(err, ValidationError::MissingGapMarker { id: "s1".into(), marker: "___" });
    assert!(err.reason().contains("s1"));
  }

  #[test]
  fn rejects_duplicate_item_ids() {
    let mut v = sample();
    v["items"][1]["id"] = json!("s1");
    assert_eq!(normalize(&v), Err(ValidationError::DuplicateItemId { id: "s1".into() }));
  }

  #[test]
  fn accepts_repeated_gap_markers() {
    let mut v = sample();
    v["items"][0]["sentence"] = json!("___ und ___");
    assert!(normalize(&v).is_ok());
  }
}
