//! Turn selection
//!
//! Picks the next turn holder uniformly at random among the players who are
//! alive and have not yet answered the current question.

use itertools::Itertools;

use crate::{
    error::Inconsistency,
    player::{PlayerId, Roster},
};

/// Chooses the next player to answer
///
/// # Errors
///
/// Returns `Inconsistency::NoEligiblePlayer` when every alive player has
/// already answered. The question loop never asks for a turn in that case.
pub fn next_turn(roster: &Roster, rng: &mut fastrand::Rng) -> Result<PlayerId, Inconsistency> {
    let eligible = roster.awaiting().map(|player| player.id).collect_vec();
    if eligible.is_empty() {
        return Err(Inconsistency::NoEligiblePlayer);
    }
    Ok(eligible[rng.usize(..eligible.len())])
}
