//! # Elimination
//!
//! Game engine for a turn-based, last-player-standing trivia game played in
//! chat channels. Each question offers one option per alive player plus a
//! single wrong one; players answer one at a time, picked options are crossed
//! off, and whoever picks the wrong option or runs out of time is out.
//!
//! The engine is transport-agnostic: notices go out through a
//! [`session::Tunnel`], timers are armed through a [`timer::Scheduler`], and
//! [`runtime`] ties both to tokio.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]

pub mod answer;
pub mod bank;
pub mod config;
pub mod constants;
pub mod error;
pub mod game;
pub mod player;
pub mod question;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod timer;
pub mod turn;

pub use error::Error;
pub use game::UpdateMessage;
