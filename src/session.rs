//! Communication with the chat transport
//!
//! This module defines the seam between the game engine and the chat
//! platform it runs on. The engine never talks to the platform directly: it
//! posts, edits, and withdraws notices through a [`Tunnel`], and receives
//! everything else it needs through a [`Context`] passed into each operation.

use serde::{Deserialize, Serialize};

use crate::{
    UpdateMessage, bank::QuestionBank, config::Options, player::ChannelId, timer::Scheduler,
};

/// Identifier of a notice posted through a [`Tunnel`]
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct MessageId(u64);

/// Interactive control attached to a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Component {
    /// Button that asks to join the lobby
    JoinButton,
    /// Menu listing the options offered by the accompanying turn prompt
    AnswerMenu,
}

/// Trait for posting notices to a channel
///
/// Implementations render the [`UpdateMessage`] for their platform. They must
/// not call back into the registry synchronously; inbound events reach the
/// engine through the runtime's event queue.
pub trait Tunnel {
    /// Posts a notice, optionally with an interactive control
    ///
    /// # Returns
    ///
    /// The identifier of the posted notice, used for later edits and deletes
    fn notify(
        &self,
        channel: ChannelId,
        message: &UpdateMessage,
        component: Option<Component>,
    ) -> MessageId;

    /// Replaces the content of a previously posted notice
    fn update(&self, channel: ChannelId, id: MessageId, message: &UpdateMessage);

    /// Deletes a previously posted notice
    fn withdraw(&self, channel: ChannelId, id: MessageId);
}

/// Everything a session operation needs from its surroundings
///
/// The registry and the sessions hold no global handles; the bank, the
/// options, the transport, and the timer scheduler are injected on every call.
pub struct Context<'a, T: Tunnel, S: Scheduler> {
    /// The shared question bank
    pub bank: &'a QuestionBank,
    /// Options that apply to every session
    pub options: &'a Options,
    /// Outbound transport
    pub tunnel: &'a T,
    /// Timer backend
    pub scheduler: &'a mut S,
}

impl<'a, T: Tunnel, S: Scheduler> Context<'a, T, S> {
    /// Bundles the collaborators for one operation
    pub fn new(
        bank: &'a QuestionBank,
        options: &'a Options,
        tunnel: &'a T,
        scheduler: &'a mut S,
    ) -> Self {
        Self {
            bank,
            options,
            tunnel,
            scheduler,
        }
    }
}
