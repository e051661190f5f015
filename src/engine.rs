//! Exercise match engine.
//!
//! Owns the word bank built from an exercise's answers, the mapping from item
//! slots to bank entries, and the reveal flag. Invariants held at all times:
//!   - every bank entry is either available or placed in exactly one slot
//!   - the bank (content and shuffled order) never changes after a load
//!
//! All operations are synchronous; intents that reference unknown items or
//! keys return a `PlacementViolation` and leave the state untouched.

use std::collections::HashMap;

use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use tracing::debug;

use crate::domain::{Exercise, Item};
use crate::error::PlacementViolation;

/// Separates the answer word from its ordinal in a bank key ("der#1").
const KEY_SEPARATOR: char = '#';

/// One placeable word token. `key` is unique even when `word` repeats.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct BankEntry {
  pub key: String,
  pub word: String,
}

/// Placement state of the loaded exercise.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Unloaded,
  Loaded,
  PartiallyPlaced,
  FullyPlaced,
}

/// Derived view of one item for rendering.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ItemView {
  pub id: String,
  pub before: String,
  pub after: String,
  #[serde(rename = "placedKey", skip_serializing_if = "Option::is_none")]
  pub placed_key: Option<String>,
  #[serde(rename = "placedWord", skip_serializing_if = "Option::is_none")]
  pub placed_word: Option<String>,
  /// Present only while results are shown.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub correct: Option<bool>,
}

/// Derived view model of the whole exercise.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ExerciseView {
  pub title: String,
  pub instructions: String,
  pub items: Vec<ItemView>,
  pub available: Vec<BankEntry>,
  #[serde(rename = "showResult")]
  pub show_result: bool,
  pub phase: Phase,
}

/// Build the unshuffled bank: one entry per item, keyed `word#n` where `n`
/// counts earlier items with the same answer.
pub fn build_bank(items: &[Item]) -> Vec<BankEntry> {
  let mut seen: HashMap<&str, usize> = HashMap::new();
  items
    .iter()
    .map(|it| {
      let n = seen.entry(it.answer.as_str()).or_insert(0);
      let key = format!("{}{}{}", it.answer, KEY_SEPARATOR, n);
      *n += 1;
      BankEntry { key, word: it.answer.clone() }
    })
    .collect()
}

#[derive(Clone, Debug, Default)]
pub struct MatchEngine {
  exercise: Option<Exercise>,
  bank: Vec<BankEntry>,
  // slots[i] is the bank index placed into exercise.items[i]
  slots: Vec<Option<usize>>,
  show_result: bool,
}

impl MatchEngine {
  /// Engine with nothing loaded.
  pub fn new() -> Self {
    Self::default()
  }

  /// Load an exercise with a thread-local RNG for the shuffle.
  pub fn load_exercise(&mut self, exercise: Exercise) {
    self.load_exercise_with_rng(exercise, &mut rand::thread_rng());
  }

  /// Replace the exercise and bank wholesale. The bank is a uniform
  /// permutation of the answers; placements are cleared and results hidden.
  pub fn load_exercise_with_rng<R: Rng + ?Sized>(&mut self, exercise: Exercise, rng: &mut R) {
    let mut bank = build_bank(&exercise.items);
    bank.shuffle(rng);
    debug!(target: "exercise", title = %exercise.title, items = exercise.items.len(), "Exercise loaded");
    *self = Self {
      slots: vec![None; exercise.items.len()],
      exercise: Some(exercise),
      bank,
      show_result: false,
    };
  }

  #[allow(dead_code)]
  pub fn exercise(&self) -> Option<&Exercise> {
    self.exercise.as_ref()
  }

  /// The full bank in shuffled order, placed entries included.
  #[allow(dead_code)]
  pub fn bank(&self) -> &[BankEntry] {
    &self.bank
  }

  #[allow(dead_code)]
  pub fn show_result(&self) -> bool {
    self.show_result
  }

  /// Put `bank_key` into the slot of `item_id`.
  ///
  /// The entry leaves whatever slot held it before, and the slot's previous
  /// entry (if different) returns to the pool. Placing an entry where it
  /// already sits changes nothing.
  pub fn place(&mut self, item_id: &str, bank_key: &str) -> Result<(), PlacementViolation> {
    let slot = self.slot_of(item_id)?;
    let entry = self
      .bank
      .iter()
      .position(|b| b.key == bank_key)
      .ok_or_else(|| PlacementViolation::UnknownBankKey { bank_key: bank_key.to_string() })?;

    if self.slots[slot] == Some(entry) {
      return Ok(());
    }
    for held in self.slots.iter_mut().filter(|s| **s == Some(entry)) {
      *held = None;
    }
    self.slots[slot] = Some(entry);
    debug!(target: "exercise", %item_id, %bank_key, "Placed");
    Ok(())
  }

  /// Empty the slot of `item_id`. Clearing an empty slot is a no-op.
  pub fn clear(&mut self, item_id: &str) -> Result<(), PlacementViolation> {
    let slot = self.slot_of(item_id)?;
    if self.slots[slot].take().is_some() {
      debug!(target: "exercise", %item_id, "Cleared");
    }
    Ok(())
  }

  /// Bank entries not placed anywhere, in bank order.
  pub fn available_words(&self) -> Vec<&BankEntry> {
    self
      .bank
      .iter()
      .enumerate()
      .filter(|(i, _)| !self.slots.contains(&Some(*i)))
      .map(|(_, b)| b)
      .collect()
  }

  /// The entry currently in the slot of `item_id`, if any.
  #[allow(dead_code)]
  pub fn placement(&self, item_id: &str) -> Option<&BankEntry> {
    let slot = self.slot_of(item_id).ok()?;
    self.slots[slot].map(|b| &self.bank[b])
  }

  pub fn toggle_show_result(&mut self) -> bool {
    self.show_result = !self.show_result;
    self.show_result
  }

  /// Per item: does the placed word equal the answer? Empty slots are `false`.
  pub fn correctness(&self) -> HashMap<String, bool> {
    let Some(exercise) = &self.exercise else {
      return HashMap::new();
    };
    exercise
      .items
      .iter()
      .zip(&self.slots)
      .map(|(it, slot)| (it.id.clone(), self.is_correct(it, *slot)))
      .collect()
  }

  /// Clear placements and hide results. The bank keeps its shuffled order.
  pub fn reset(&mut self) {
    self.slots.iter_mut().for_each(|s| *s = None);
    self.show_result = false;
    debug!(target: "exercise", "Exercise reset");
  }

  pub fn phase(&self) -> Phase {
    if self.exercise.is_none() {
      return Phase::Unloaded;
    }
    let placed = self.slots.iter().filter(|s| s.is_some()).count();
    match placed {
      0 => Phase::Loaded,
      n if n == self.slots.len() => Phase::FullyPlaced,
      _ => Phase::PartiallyPlaced,
    }
  }

  /// Derived view model, or `None` while nothing is loaded.
  pub fn view(&self) -> Option<ExerciseView> {
    let exercise = self.exercise.as_ref()?;
    let grades = self.show_result.then(|| self.correctness());
    let items = exercise
      .items
      .iter()
      .zip(&self.slots)
      .map(|(it, slot)| {
        let (before, after) = it.fragments();
        let entry = slot.map(|b| &self.bank[b]);
        ItemView {
          id: it.id.clone(),
          before: before.to_string(),
          after: after.to_string(),
          placed_key: entry.map(|e| e.key.clone()),
          placed_word: entry.map(|e| e.word.clone()),
          correct: grades.as_ref().and_then(|g| g.get(&it.id).copied()),
        }
      })
      .collect();

    Some(ExerciseView {
      title: exercise.title.clone(),
      instructions: exercise.instructions.clone(),
      items,
      available: self.available_words().into_iter().cloned().collect(),
      show_result: self.show_result,
      phase: self.phase(),
    })
  }

  fn is_correct(&self, item: &Item, slot: Option<usize>) -> bool {
    slot.is_some_and(|b| self.bank[b].word == item.answer)
  }

  fn slot_of(&self, item_id: &str) -> Result<usize, PlacementViolation> {
    let exercise = self.exercise.as_ref().ok_or(PlacementViolation::NoExercise)?;
    exercise
      .items
      .iter()
      .position(|it| it.id == item_id)
      .ok_or_else(|| PlacementViolation::UnknownItem { item_id: item_id.to_string() })
  }
}
