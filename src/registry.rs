//! Channel-to-session registry
//!
//! At most one session runs per channel. Every operation locks only the
//! channel it targets, so sessions in different channels never wait on each
//! other. A session that finishes during an operation is removed before the
//! operation returns.
//!
//! The tunnel and the scheduler are called while the channel's entry is
//! locked. Neither may call back into the registry synchronously.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{
    DashMap,
    mapref::{entry::Entry, one::Ref},
};
use tracing::{debug, error, info, warn};

use crate::{
    answer::Outcome,
    error::{Error, Precondition},
    game::Game,
    player::{ChannelId, PlayerId},
    session::{Context, Tunnel},
    timer::{AlarmMessage, Delivery, Scheduler},
};

/// All running sessions, keyed by channel
#[derive(Debug, Default)]
pub struct Registry {
    sessions: DashMap<ChannelId, Game>,
    next_instance: AtomicU64,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of running sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is running
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether a session is running in `channel`
    pub fn contains(&self, channel: ChannelId) -> bool {
        self.sessions.contains_key(&channel)
    }

    /// Looks up the session running in `channel`
    ///
    /// The returned guard locks the channel's shard; drop it before calling
    /// any other registry operation.
    pub fn get(&self, channel: ChannelId) -> Option<Ref<'_, ChannelId, Game>> {
        self.sessions.get(&channel)
    }

    fn rng_for(channel: ChannelId, seed: Option<u64>) -> fastrand::Rng {
        seed.map_or_else(fastrand::Rng::new, |seed| {
            fastrand::Rng::with_seed(seed ^ channel.get())
        })
    }

    /// Creates a session in `channel` and opens its lobby
    ///
    /// # Errors
    ///
    /// `Precondition::AlreadyActive` if a session is already running in the
    /// channel.
    pub fn start<T: Tunnel, S: Scheduler>(
        &self,
        channel: ChannelId,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<(), Error> {
        match self.sessions.entry(channel) {
            Entry::Occupied(_) => {
                warn!(%channel, "start rejected: game already running");
                Err(Precondition::AlreadyActive.into())
            }
            Entry::Vacant(entry) => {
                let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);
                let mut game = Game::new(
                    channel,
                    instance,
                    Self::rng_for(channel, ctx.options.seed),
                );
                game.open_lobby(ctx);
                entry.insert(game);
                info!(%channel, instance, "session created");
                Ok(())
            }
        }
    }

    /// Removes the session in `channel` without telling the channel
    ///
    /// Its timers are cancelled. Removing an absent session does nothing.
    ///
    /// # Returns
    ///
    /// Whether a session was removed
    pub fn remove<T: Tunnel, S: Scheduler>(
        &self,
        channel: ChannelId,
        ctx: &mut Context<'_, T, S>,
    ) -> bool {
        match self.sessions.remove(&channel) {
            Some((_, mut game)) => {
                game.terminate(ctx);
                debug!(%channel, "session removed");
                true
            }
            None => false,
        }
    }

    /// Force-stops the session in `channel` and posts a notice
    ///
    /// # Errors
    ///
    /// `Precondition::NotActive` if no session is running in the channel.
    pub fn stop<T: Tunnel, S: Scheduler>(
        &self,
        channel: ChannelId,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<(), Error> {
        let Some((_, mut game)) = self.sessions.remove(&channel) else {
            warn!(%channel, "stop rejected: no game running");
            return Err(Precondition::NotActive.into());
        };
        game.stop(ctx);
        Ok(())
    }

    /// Adds `player` to the lobby in `channel`
    ///
    /// # Returns
    ///
    /// The roster size after the player joined
    ///
    /// # Errors
    ///
    /// `Precondition::NotActive` if no session is running in the channel, or
    /// any precondition from [`Game::join`].
    pub fn join<T: Tunnel, S: Scheduler>(
        &self,
        channel: ChannelId,
        player: PlayerId,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<usize, Error> {
        self.drive(channel, ctx, |game, ctx| {
            game.join(player, ctx).map_err(Error::from)
        })
    }

    /// Submits `player`'s pick in `channel`
    ///
    /// # Errors
    ///
    /// `Precondition::NotActive` if no session is running in the channel, or
    /// any error from [`Game::submit`].
    pub fn answer<T: Tunnel, S: Scheduler>(
        &self,
        channel: ChannelId,
        player: PlayerId,
        text: &str,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<Outcome, Error> {
        self.drive(channel, ctx, |game, ctx| game.submit(player, text, ctx))
    }

    /// Routes a fired timer to its session
    ///
    /// # Returns
    ///
    /// `Delivery::Stale` if the session is gone or the timer no longer
    /// applies.
    ///
    /// # Errors
    ///
    /// Failures raised while the session advanced; the session has been
    /// stopped.
    pub fn deliver<T: Tunnel, S: Scheduler>(
        &self,
        message: &AlarmMessage,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<Delivery, Error> {
        let channel = message.handle.channel;
        if !self.contains(channel) {
            debug!(%channel, timer = message.handle.serial, "alarm for absent session");
            return Ok(Delivery::Stale);
        }
        match self.drive(channel, ctx, |game, ctx| game.receive_alarm(message, ctx)) {
            Err(Error::Precondition(Precondition::NotActive)) => Ok(Delivery::Stale),
            result => result,
        }
    }

    /// Runs `operation` on the session in `channel` under its entry lock
    ///
    /// Rejected actions are logged and leave the session as it was. Any other
    /// failure stops the session. Finished sessions are removed afterwards.
    fn drive<R, T: Tunnel, S: Scheduler>(
        &self,
        channel: ChannelId,
        ctx: &mut Context<'_, T, S>,
        operation: impl FnOnce(&mut Game, &mut Context<'_, T, S>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let result = {
            let Some(mut game) = self.sessions.get_mut(&channel) else {
                return Err(Precondition::NotActive.into());
            };
            let result = operation(&mut *game, ctx);
            match &result {
                Ok(_) => {}
                Err(Error::Precondition(precondition)) => {
                    warn!(%channel, %precondition, "action rejected");
                }
                Err(failure) => {
                    error!(%channel, %failure, "session failed; stopping it");
                    game.stop(ctx);
                }
            }
            result
        };

        if self
            .sessions
            .remove_if(&channel, |_, game| game.is_finished())
            .is_some()
        {
            info!(%channel, "session finished");
        }
        result
    }
}
