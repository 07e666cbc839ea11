//! Error taxonomy
//!
//! Rejected user actions are [`Precondition`] violations and leave the
//! session untouched. Broken internal invariants are [`Inconsistency`]
//! defects. Stale alarms are not errors at all; see
//! [`crate::timer::Delivery`].

use serde::Serialize;
use thiserror::Error;

/// A user action that cannot be applied to the session in its current state
///
/// These are surfaced only to the user who triggered the action.
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// A session is already running in the channel
    #[error("a game is already running in this channel")]
    AlreadyActive,
    /// No session is running in the channel
    #[error("no game is running in this channel")]
    NotActive,
    /// The player is already on the roster
    #[error("player has already joined")]
    AlreadyJoined,
    /// The roster is at capacity
    #[error("player maximum has been reached")]
    LobbyFull,
    /// The first question has already been asked
    #[error("a game is in progress")]
    GameInProgress,
    /// The submitting player is not the current turn holder
    #[error("it is not this player's turn to answer")]
    NotYourTurn,
    /// The selected answer is not offered by the current question
    #[error("this selection is no longer offered")]
    StaleSelection,
}

/// An internal invariant was found broken
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    /// Win detection ran with a survivor count other than one
    #[error("expected exactly one survivor, found {0}")]
    SurvivorCount(usize),
    /// A turn was due but no eligible player could be found
    #[error("no alive player is left to take a turn")]
    NoEligiblePlayer,
}

/// Errors returned by session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The action was rejected; nothing changed
    #[error(transparent)]
    Precondition(#[from] Precondition),
    /// An internal invariant was broken; the session has been stopped
    #[error("internal inconsistency: {0}")]
    Inconsistency(#[from] Inconsistency),
    /// A question could not be generated for the current roster
    #[error("question generation failed: {0}")]
    Generation(#[from] crate::question::Error),
}
