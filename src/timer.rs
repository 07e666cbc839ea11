//! Cancellable, epoch-guarded timers
//!
//! A session never owns a running timer directly. It records what it armed
//! in [`Timers`] and hands an [`AlarmMessage`] to a [`Scheduler`], which
//! delivers the message back after the delay. On delivery the session checks
//! that the timer is still armed and that the epoch captured at arm time is
//! still current; anything else is a stale alarm and is ignored.
//!
//! The epoch advances every time the session disarms its timers, which it does
//! whenever it leaves a state that armed them. The `instance` number in every
//! handle tells two sessions that used the same channel apart.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;
use web_time::Instant;

use crate::{game::Alarm, player::ChannelId};

/// Identity of one armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle {
    /// Channel of the owning session
    pub channel: ChannelId,
    /// Registry-issued number of the owning session
    pub instance: u64,
    /// Per-session timer number
    pub serial: u64,
}

/// Message delivered to a session when one of its timers fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmMessage {
    /// The timer that fired
    pub handle: TimerHandle,
    /// Session epoch when the timer was armed
    pub epoch: u64,
    /// What the session should do
    pub alarm: Alarm,
}

/// Result of delivering an alarm or a step to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The session acted on it
    Applied,
    /// The session had moved on or no longer exists; nothing changed
    Stale,
}

/// Delivers alarm messages back to the registry after a delay
///
/// Implementations must deliver every scheduled message that has not been
/// cancelled. Delivering a cancelled message is harmless: the guard in
/// [`Timers::accept`] turns it into a no-op.
pub trait Scheduler {
    /// Schedules `alarm` to be delivered after `delay`
    fn schedule(&mut self, alarm: AlarmMessage, delay: Duration);

    /// Stops a pending delivery, if any
    fn cancel(&mut self, handle: TimerHandle);
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    alarm: Alarm,
    epoch: u64,
    period: Option<Duration>,
    expires_at: Instant,
}

/// The set of timers a session has armed
#[derive(Debug)]
pub struct Timers {
    channel: ChannelId,
    instance: u64,
    epoch: u64,
    next_serial: u64,
    armed: HashMap<u64, Armed>,
}

impl Timers {
    /// Creates an empty timer set for a session
    pub fn new(channel: ChannelId, instance: u64) -> Self {
        Self {
            channel,
            instance,
            epoch: 0,
            next_serial: 0,
            armed: HashMap::new(),
        }
    }

    /// The session's current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The registry-issued number of the owning session
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Number of timers currently armed
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Whether `handle` is still armed
    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.owns(handle) && self.armed.contains_key(&handle.serial)
    }

    fn owns(&self, handle: TimerHandle) -> bool {
        handle.channel == self.channel && handle.instance == self.instance
    }

    fn handle(&self, serial: u64) -> TimerHandle {
        TimerHandle {
            channel: self.channel,
            instance: self.instance,
            serial,
        }
    }

    fn insert<S: Scheduler>(
        &mut self,
        alarm: Alarm,
        delay: Duration,
        period: Option<Duration>,
        scheduler: &mut S,
    ) -> TimerHandle {
        let handle = self.handle(self.next_serial);
        self.next_serial += 1;
        self.armed.insert(
            handle.serial,
            Armed {
                alarm,
                epoch: self.epoch,
                period,
                expires_at: Instant::now() + delay,
            },
        );
        debug!(
            channel = %self.channel,
            timer = handle.serial,
            epoch = self.epoch,
            ?alarm,
            delay_ms = delay.as_millis() as u64,
            "armed timer"
        );
        scheduler.schedule(
            AlarmMessage {
                handle,
                epoch: self.epoch,
                alarm,
            },
            delay,
        );
        handle
    }

    /// Arms a one-shot timer bound to the current epoch
    pub fn arm<S: Scheduler>(
        &mut self,
        alarm: Alarm,
        delay: Duration,
        scheduler: &mut S,
    ) -> TimerHandle {
        self.insert(alarm, delay, None, scheduler)
    }

    /// Arms a timer that fires every `period` until cancelled
    pub fn arm_repeating<S: Scheduler>(
        &mut self,
        alarm: Alarm,
        period: Duration,
        scheduler: &mut S,
    ) -> TimerHandle {
        self.insert(alarm, period, Some(period), scheduler)
    }

    /// Cancels a single timer; cancelling an unknown handle does nothing
    pub fn cancel<S: Scheduler>(&mut self, handle: TimerHandle, scheduler: &mut S) {
        if self.owns(handle) && self.armed.remove(&handle.serial).is_some() {
            debug!(channel = %self.channel, timer = handle.serial, "cancelled timer");
            scheduler.cancel(handle);
        }
    }

    /// Cancels every armed timer and advances the epoch
    ///
    /// Called whenever the session leaves a state that armed timers, so that
    /// anything armed for the old state can no longer act.
    pub fn disarm_all<S: Scheduler>(&mut self, scheduler: &mut S) {
        for serial in self.armed.keys().copied().collect::<Vec<_>>() {
            scheduler.cancel(self.handle(serial));
        }
        self.armed.clear();
        self.epoch += 1;
        debug!(channel = %self.channel, epoch = self.epoch, "disarmed timers");
    }

    /// Checks a delivered alarm against the armed set and the epoch
    ///
    /// A one-shot timer is consumed by a successful check. A repeating timer
    /// stays armed and its next delivery is scheduled before returning.
    ///
    /// Returns `false` for stale deliveries: a foreign or cancelled handle, or
    /// an epoch that has since advanced.
    pub fn accept<S: Scheduler>(&mut self, message: &AlarmMessage, scheduler: &mut S) -> bool {
        if !self.owns(message.handle) || message.epoch != self.epoch {
            return false;
        }
        let Some(armed) = self.armed.get(&message.handle.serial).copied() else {
            return false;
        };
        if armed.epoch != message.epoch || armed.alarm != message.alarm {
            return false;
        }

        let now = Instant::now();
        debug!(
            channel = %self.channel,
            timer = message.handle.serial,
            late_ms = now.saturating_duration_since(armed.expires_at).as_millis() as u64,
            "timer fired"
        );

        match armed.period {
            Some(period) => {
                if let Some(entry) = self.armed.get_mut(&message.handle.serial) {
                    entry.expires_at = now + period;
                }
                scheduler.schedule(*message, period);
            }
            None => {
                self.armed.remove(&message.handle.serial);
            }
        }
        true
    }
}
