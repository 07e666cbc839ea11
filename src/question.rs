//! Question and distractor generation
//!
//! A question offers one option per alive player plus one: every option is
//! correct except a single wrong one. Options are keyed by their text, and
//! the map keeps the slot order the generator chose so every view of the
//! question lists the options the same way.

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::bank::{QuestionBank, QuestionRecord};

/// One option of the current question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerRecord {
    /// Fixed at generation time
    pub correct: bool,
    /// Set once a player picks it correctly, so later pickers see it crossed off
    pub picked: bool,
}

impl AnswerRecord {
    fn new(correct: bool) -> Self {
        Self {
            correct,
            picked: false,
        }
    }
}

/// A generated question with its options in slot order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Question {
    /// The question text
    pub text: String,
    /// Options keyed by their text
    answers: IndexMap<String, AnswerRecord>,
}

/// Errors that can occur while generating a question
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The record does not have enough distinct correct answers for the roster
    #[error("{needed} correct answers needed but only {available} candidates exist")]
    NotEnoughCandidates {
        /// Number of correct options the roster requires
        needed: usize,
        /// Number of candidates in the record
        available: usize,
    },
}

impl Question {
    /// Generates a question for `alive` players from a random bank record
    ///
    /// # Errors
    ///
    /// Returns `Error::NotEnoughCandidates` if the drawn record cannot supply
    /// `alive` distinct correct answers.
    pub fn generate(
        bank: &QuestionBank,
        alive: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Self, Error> {
        Self::from_record(bank.draw(rng), alive, rng)
    }

    /// Builds `alive + 1` distinct options from a record
    ///
    /// The wrong answer goes into a uniformly random slot in `[0, alive]`.
    /// The remaining slots are filled by a partial Fisher-Yates shuffle of the
    /// candidate pool, which yields the same distribution as redrawing on
    /// duplicates without the unbounded loop.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotEnoughCandidates` if `alive` exceeds the pool size.
    pub fn from_record(
        record: &QuestionRecord,
        alive: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Self, Error> {
        let available = record.correct.len();
        if alive > available {
            return Err(Error::NotEnoughCandidates {
                needed: alive,
                available,
            });
        }

        let mut pool = (0..available).collect_vec();
        for slot in 0..alive {
            let pick = rng.usize(slot..available);
            pool.swap(slot, pick);
        }

        let wrong_slot = rng.usize(..=alive);
        let mut correct = pool[..alive].iter().map(|&i| record.correct[i].clone());

        let mut answers = IndexMap::with_capacity(alive + 1);
        for slot in 0..=alive {
            if slot == wrong_slot {
                answers.insert(record.wrong.clone(), AnswerRecord::new(false));
            } else if let Some(text) = correct.next() {
                answers.insert(text, AnswerRecord::new(true));
            }
        }

        Ok(Self {
            text: record.question.clone(),
            answers,
        })
    }

    /// Looks up an option by its text
    pub fn get(&self, text: &str) -> Option<&AnswerRecord> {
        self.answers.get(text)
    }

    /// Crosses an option off after a correct pick
    pub fn mark_picked(&mut self, text: &str) {
        if let Some(record) = self.answers.get_mut(text) {
            record.picked = true;
        }
    }

    /// All options in slot order
    pub fn answers(&self) -> impl Iterator<Item = (&str, &AnswerRecord)> {
        self.answers.iter().map(|(text, record)| (text.as_str(), record))
    }

    /// Options nobody has picked yet, in slot order
    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.answers()
            .filter(|(_, record)| !record.picked)
            .map(|(text, _)| text)
    }

    /// Number of options
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// Whether the question has no options (only before the first question)
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Number of options marked incorrect
    pub fn incorrect_count(&self) -> usize {
        self.answers.values().filter(|record| !record.correct).count()
    }

    /// Drops every option
    pub fn clear(&mut self) {
        self.text.clear();
        self.answers.clear();
    }
}
