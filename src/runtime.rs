//! Tokio runtime for the registry
//!
//! A single [`Driver`] task owns the [`Registry`] and handles every inbound
//! command and every fired timer in arrival order. Timers are spawned sleep
//! tasks that post their [`AlarmMessage`] back to the driver; cancelling a
//! timer aborts its task. Callers talk to the driver through a cloneable
//! [`Handle`].

use std::{collections::HashMap, time::Duration};

use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    answer::Outcome,
    bank::QuestionBank,
    config::Options,
    error::Error,
    player::{ChannelId, PlayerId},
    registry::Registry,
    session::{Context, Tunnel},
    timer::{AlarmMessage, Scheduler, TimerHandle},
};

/// An inbound action from a player or a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a game in a channel
    Start {
        /// Target channel
        channel: ChannelId,
    },
    /// Stop the game running in a channel
    Stop {
        /// Target channel
        channel: ChannelId,
    },
    /// Join the lobby in a channel
    Join {
        /// Target channel
        channel: ChannelId,
        /// The joining player
        player: PlayerId,
    },
    /// Pick an option for the current question
    Answer {
        /// Target channel
        channel: ChannelId,
        /// The answering player
        player: PlayerId,
        /// The picked option
        text: String,
    },
}

/// What a successful [`Command`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// A lobby was opened
    Started,
    /// The game was stopped
    Stopped,
    /// The player joined; the roster now has `count` players
    Joined {
        /// Roster size after joining
        count: usize,
    },
    /// The pick was committed
    Answered(Outcome),
}

/// Errors returned through a [`Handle`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The driver has shut down
    #[error("the game driver is no longer running")]
    Closed,
    /// The command was rejected or failed
    #[error(transparent)]
    Game(#[from] Error),
}

struct Request {
    command: Command,
    reply: oneshot::Sender<Result<Reply, Error>>,
}

/// Scheduler that runs each timer as a sleeping tokio task
#[derive(Debug)]
pub struct TokioScheduler {
    alarms: mpsc::UnboundedSender<AlarmMessage>,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
}

impl TokioScheduler {
    fn new(alarms: mpsc::UnboundedSender<AlarmMessage>) -> Self {
        Self {
            alarms,
            tasks: HashMap::new(),
        }
    }

    /// Number of timer tasks that have not fired or been cancelled
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    fn fired(&mut self, handle: TimerHandle) {
        self.tasks.remove(&handle);
    }

    fn shutdown(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, alarm: AlarmMessage, delay: Duration) {
        let alarms = self.alarms.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = alarms.send(alarm);
        });
        if let Some(previous) = self.tasks.insert(alarm.handle, task) {
            previous.abort();
        }
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

/// Cloneable entry point for sending commands to a running [`Driver`]
#[derive(Debug, Clone)]
pub struct Handle {
    requests: mpsc::UnboundedSender<Request>,
}

impl Handle {
    /// Sends `command` to the driver and waits for its reply
    ///
    /// # Errors
    ///
    /// * `RequestError::Closed` - The driver is no longer running
    /// * `RequestError::Game` - The command was rejected or failed
    pub async fn request(&self, command: Command) -> Result<Reply, RequestError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .map_err(|_| RequestError::Closed)?;
        Ok(response.await.map_err(|_| RequestError::Closed)??)
    }
}

/// Owns the registry and serializes every event that reaches it
pub struct Driver<T: Tunnel> {
    registry: Registry,
    bank: QuestionBank,
    options: Options,
    tunnel: T,
    scheduler: TokioScheduler,
    requests: mpsc::UnboundedReceiver<Request>,
    alarms: mpsc::UnboundedReceiver<AlarmMessage>,
}

impl<T: Tunnel> Driver<T> {
    /// Creates a driver and the handle used to reach it
    ///
    /// The driver does nothing until [`Driver::run`] is awaited.
    pub fn new(bank: QuestionBank, options: Options, tunnel: T) -> (Self, Handle) {
        let (request_tx, requests) = mpsc::unbounded_channel();
        let (alarm_tx, alarms) = mpsc::unbounded_channel();
        (
            Self {
                registry: Registry::new(),
                bank,
                options,
                tunnel,
                scheduler: TokioScheduler::new(alarm_tx),
                requests,
                alarms,
            },
            Handle {
                requests: request_tx,
            },
        )
    }

    /// Handles events until every [`Handle`] has been dropped
    ///
    /// Timers still pending at that point are aborted.
    pub async fn run(mut self) {
        info!("game driver running");
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request { command, reply }) => {
                        let result = self.handle(command);
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                Some(alarm) = self.alarms.recv() => self.fire(alarm),
            }
        }
        let aborted = self.scheduler.pending();
        self.scheduler.shutdown();
        info!(
            sessions = self.registry.len(),
            aborted_timers = aborted,
            "game driver stopped"
        );
    }

    fn handle(&mut self, command: Command) -> Result<Reply, Error> {
        debug!(?command, "handling command");
        let mut ctx = Context::new(
            &self.bank,
            &self.options,
            &self.tunnel,
            &mut self.scheduler,
        );
        match command {
            Command::Start { channel } => self
                .registry
                .start(channel, &mut ctx)
                .map(|()| Reply::Started),
            Command::Stop { channel } => self
                .registry
                .stop(channel, &mut ctx)
                .map(|()| Reply::Stopped),
            Command::Join { channel, player } => self
                .registry
                .join(channel, player, &mut ctx)
                .map(|count| Reply::Joined { count }),
            Command::Answer {
                channel,
                player,
                text,
            } => self
                .registry
                .answer(channel, player, &text, &mut ctx)
                .map(Reply::Answered),
        }
    }

    fn fire(&mut self, alarm: AlarmMessage) {
        self.scheduler.fired(alarm.handle);
        let mut ctx = Context::new(
            &self.bank,
            &self.options,
            &self.tunnel,
            &mut self.scheduler,
        );
        // Failures are logged by the registry, which also stops the session.
        let _ = self.registry.deliver(&alarm, &mut ctx);
    }
}
