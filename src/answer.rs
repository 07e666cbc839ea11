//! Answer resolution
//!
//! Validates a submitted answer against the current question and turn holder
//! and applies its outcome to the roster. What the session does next is
//! described by [`FollowUp`].

use serde::{Deserialize, Serialize};

use crate::{
    error::Precondition,
    player::{PlayerId, Roster},
    question::Question,
};

/// Result of a committed answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The player picked a correct option and stays in the game
    Correct,
    /// The player picked the wrong option, or ran out of time, and is eliminated
    Incorrect,
}

/// What the session should do once an outcome has been revealed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Someone was eliminated: start a new question or declare the winner
    Eliminated,
    /// Every alive player answered correctly: start a new question
    AllCorrect,
    /// Players are still waiting for their turn on this question
    NextTurn,
}

impl FollowUp {
    /// Decides the follow-up for an applied outcome
    pub fn after(outcome: Outcome, roster: &Roster) -> Self {
        match outcome {
            Outcome::Incorrect => Self::Eliminated,
            Outcome::Correct if roster.all_alive_answered() => Self::AllCorrect,
            Outcome::Correct => Self::NextTurn,
        }
    }
}

/// Validates and applies an answer
///
/// # Arguments
///
/// * `roster` - The session roster
/// * `question` - The current question
/// * `turn_holder` - The player currently prompted, if any
/// * `player` - The player who submitted the answer
/// * `text` - The option the player selected
///
/// # Errors
///
/// * `Precondition::StaleSelection` - `text` is not an open option of the
///   current question (the question changed, or the option was already picked)
/// * `Precondition::NotYourTurn` - `player` is not the turn holder
pub fn submit(
    roster: &mut Roster,
    question: &mut Question,
    turn_holder: Option<PlayerId>,
    player: PlayerId,
    text: &str,
) -> Result<Outcome, Precondition> {
    let record = match question.get(text) {
        Some(record) if !record.picked => *record,
        _ => return Err(Precondition::StaleSelection),
    };
    if turn_holder != Some(player) {
        return Err(Precondition::NotYourTurn);
    }

    roster.mark_answered(player);
    if record.correct {
        question.mark_picked(text);
        Ok(Outcome::Correct)
    } else {
        roster.eliminate(player);
        Ok(Outcome::Incorrect)
    }
}
