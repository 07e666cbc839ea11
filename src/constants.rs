//! Configuration constants for the elimination game
//!
//! This module contains the limits and default timings used throughout the
//! crate to keep sessions, question banks, and options within consistent
//! boundaries.

/// Roster limits
pub mod roster {
    /// Maximum number of players allowed in a single session
    pub const MAX_PLAYER_COUNT: usize = 8;
    /// Minimum number of players required for the lobby to start a game
    pub const MIN_PLAYER_COUNT: usize = 2;
}

/// Question bank limits
pub mod bank {
    /// Number of candidate correct answers every question record must supply
    pub const CANDIDATE_COUNT: usize = 8;
    /// Minimum length of a question text
    pub const MIN_QUESTION_LENGTH: usize = 1;
    /// Maximum length of a question text
    pub const MAX_QUESTION_LENGTH: usize = 200;
    /// Minimum length of an answer text
    pub const MIN_ANSWER_LENGTH: usize = 1;
    /// Maximum length of an answer text
    pub const MAX_ANSWER_LENGTH: usize = 100;
}

/// Timing defaults and bounds, all in seconds
pub mod timing {
    /// Default period of the repeating lobby timer (the lobby lasts two ticks)
    pub const DEFAULT_LOBBY_TICK: u64 = 10;
    /// Minimum lobby tick period
    pub const MIN_LOBBY_TICK: u64 = 1;
    /// Maximum lobby tick period
    pub const MAX_LOBBY_TICK: u64 = 60;
    /// Default time a turn holder has to pick an answer
    pub const DEFAULT_TIME_LIMIT: u64 = 20;
    /// Minimum answer time limit
    pub const MIN_TIME_LIMIT: u64 = 5;
    /// Maximum answer time limit
    pub const MAX_TIME_LIMIT: u64 = 240;
    /// Default pause between consecutive reveal steps
    pub const DEFAULT_PACING: u64 = 3;
    /// Minimum pause between reveal steps (zero runs them back to back)
    pub const MIN_PACING: u64 = 0;
    /// Maximum pause between reveal steps
    pub const MAX_PACING: u64 = 10;
}
