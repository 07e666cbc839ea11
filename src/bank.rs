//! Question bank
//!
//! The bank is read once at startup and shared read-only by every session.
//! Each record supplies one wrong answer and a fixed pool of candidate
//! correct answers that the generator draws from.

use std::{fs, path::Path};

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::constants::bank::{
    CANDIDATE_COUNT, MAX_ANSWER_LENGTH, MAX_QUESTION_LENGTH, MIN_ANSWER_LENGTH,
    MIN_QUESTION_LENGTH,
};

type ValidationResult = garde::Result;

/// Checks that the candidate pool is free of duplicates
fn validate_distinct(candidates: &[String]) -> ValidationResult {
    if candidates.iter().all_unique() {
        Ok(())
    } else {
        Err(garde::Error::new("correct answers must be distinct"))
    }
}

/// A single question with its wrong answer and candidate correct answers
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuestionRecord {
    /// The question text shown to players
    #[garde(length(chars, min = MIN_QUESTION_LENGTH, max = MAX_QUESTION_LENGTH))]
    pub question: String,
    /// The one answer that eliminates whoever picks it
    #[garde(length(chars, min = MIN_ANSWER_LENGTH, max = MAX_ANSWER_LENGTH))]
    pub wrong: String,
    /// Pool the correct answers are drawn from
    #[garde(
        length(min = CANDIDATE_COUNT, max = CANDIDATE_COUNT),
        inner(length(chars, min = MIN_ANSWER_LENGTH, max = MAX_ANSWER_LENGTH)),
        custom(|v, _| validate_distinct(v))
    )]
    pub correct: Vec<String>,
}

impl QuestionRecord {
    /// Whether the wrong answer also appears among the correct candidates
    fn is_ambiguous(&self) -> bool {
        self.correct.contains(&self.wrong)
    }
}

/// The full collection of questions
///
/// Only built through [`QuestionBank::new`] or [`QuestionBank::from_json`],
/// so every bank in hand has at least one valid record.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct QuestionBank {
    /// Records in file order
    #[garde(length(min = 1), dive)]
    question_list: Vec<QuestionRecord>,
}

/// Bank file layout, before validation
#[derive(Deserialize)]
struct BankDocument {
    question_list: Vec<QuestionRecord>,
}

/// Errors that can occur while loading a question bank
#[derive(Error, Debug)]
pub enum Error {
    /// The bank file could not be read
    #[error("failed to read question bank: {0}")]
    Io(#[from] std::io::Error),
    /// The bank file is not a well-formed bank document
    #[error("failed to parse question bank: {0}")]
    Parse(#[from] serde_json::Error),
    /// The bank violates its structural rules
    #[error("invalid question bank: {0}")]
    Invalid(String),
}

impl QuestionBank {
    /// Builds a bank from records, validating every one of them
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if the list is empty or any record breaks
    /// the length, candidate count, or distinctness rules.
    pub fn new(question_list: Vec<QuestionRecord>) -> Result<Self, Error> {
        let bank = Self { question_list };
        bank.check()?;
        Ok(bank)
    }

    /// Parses and validates a bank from a JSON document
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` for malformed JSON and `Error::Invalid` for a
    /// document that parses but breaks the bank rules.
    pub fn from_json(contents: &str) -> Result<Self, Error> {
        let document: BankDocument = serde_json::from_str(contents)?;
        Self::new(document.question_list)
    }

    /// Reads, parses, and validates a bank file
    ///
    /// # Errors
    ///
    /// Any of the `Error` variants; callers treat all of them as fatal.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let bank = Self::from_json(&fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            count = bank.len(),
            "loaded question bank"
        );
        Ok(bank)
    }

    fn check(&self) -> Result<(), Error> {
        self.validate()
            .map_err(|report| Error::Invalid(report.to_string()))?;

        let ambiguous = self
            .question_list
            .iter()
            .positions(QuestionRecord::is_ambiguous)
            .collect_vec();
        if ambiguous.is_empty() {
            Ok(())
        } else {
            Err(Error::Invalid(format!(
                "wrong answer repeated among correct answers in records {}",
                ambiguous.iter().join(", ")
            )))
        }
    }

    /// Draws one record uniformly at random
    pub fn draw(&self, rng: &mut fastrand::Rng) -> &QuestionRecord {
        &self.question_list[rng.usize(..self.question_list.len())]
    }

    /// Number of records in the bank
    pub fn len(&self) -> usize {
        self.question_list.len()
    }

    /// Whether the bank has no records (never true for a validated bank)
    pub fn is_empty(&self) -> bool {
        self.question_list.is_empty()
    }
}
