//! Players, channels, and the session roster
//!
//! The roster keeps players in join order. Players are never removed once
//! the lobby closes; elimination only clears their alive flag. The alive
//! count is maintained incrementally on every mutation.

use serde::{Deserialize, Serialize};

use crate::error::Precondition;

/// Identifier of the chat channel a session is bound to
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::FromStr,
)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Wraps a raw numeric identifier
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric identifier
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Identifier of a player (the chat user)
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::FromStr,
)]
#[serde(transparent)]
pub struct PlayerId(u64);

/// A player on the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    /// Identity of the player
    pub id: PlayerId,
    /// Whether the player is still in the game
    pub alive: bool,
    /// Whether the player has answered the current question
    pub answered: bool,
}

impl Player {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            alive: true,
            answered: false,
        }
    }
}

/// Ordered roster of a session
#[derive(Debug, Default, Clone, Serialize)]
pub struct Roster {
    /// Players in join order
    players: Vec<Player>,
    /// Number of players with `alive` set
    alive_count: usize,
}

impl Roster {
    /// Appends a player to the roster
    ///
    /// # Arguments
    ///
    /// * `id` - The joining player
    /// * `capacity` - Maximum roster size
    ///
    /// # Returns
    ///
    /// The roster size after the player joined
    ///
    /// # Errors
    ///
    /// * `Precondition::AlreadyJoined` - The player is already on the roster
    /// * `Precondition::LobbyFull` - The roster is at capacity
    pub fn add(&mut self, id: PlayerId, capacity: usize) -> Result<usize, Precondition> {
        if self.get(id).is_some() {
            return Err(Precondition::AlreadyJoined);
        }
        if self.players.len() >= capacity {
            return Err(Precondition::LobbyFull);
        }
        self.players.push(Player::new(id));
        self.alive_count += 1;
        Ok(self.players.len())
    }

    /// Looks up a player by identity
    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    /// Marks a player as no longer alive
    ///
    /// Returns `true` if the player was alive before the call.
    pub fn eliminate(&mut self, id: PlayerId) -> bool {
        match self.get_mut(id) {
            Some(player) if player.alive => {
                player.alive = false;
                self.alive_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Marks a player as having answered the current question
    pub fn mark_answered(&mut self, id: PlayerId) {
        if let Some(player) = self.get_mut(id) {
            player.answered = true;
        }
    }

    /// Clears every player's answered flag ahead of a new question
    pub fn reset_answers(&mut self) {
        for player in &mut self.players {
            player.answered = false;
        }
    }

    /// Number of players still alive
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Number of players who joined
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether nobody has joined
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players in join order
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    /// Players who are alive and have not answered the current question
    pub fn awaiting(&self) -> impl Iterator<Item = &Player> {
        self.players
            .iter()
            .filter(|player| player.alive && !player.answered)
    }

    /// Whether every alive player has answered the current question
    pub fn all_alive_answered(&self) -> bool {
        self.awaiting().next().is_none()
    }

    /// Players still alive, in join order
    pub fn survivors(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|player| player.alive)
    }
}
