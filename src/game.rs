//! Core game logic and state management
//!
//! This module contains the per-channel session state machine. A session
//! opens a lobby, asks questions one turn at a time, eliminates players who
//! pick the wrong option or run out of time, and declares the last player
//! standing the winner.
//!
//! Every timed step, including the pauses between reveal notices, is an
//! [`Alarm`] armed through the session's [`Timers`]. Nothing here ever
//! blocks, so one session's reveal sequence never holds up another session.

use std::{fmt::Debug, time::Duration};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::{debug, info};

use crate::{
    answer::{self, FollowUp, Outcome},
    constants::roster::MIN_PLAYER_COUNT,
    error::{Error, Inconsistency, Precondition},
    player::{ChannelId, PlayerId, Roster},
    question::Question,
    session::{Component, Context, MessageId, Tunnel},
    timer::{AlarmMessage, Delivery, Scheduler, Timers},
    turn,
};

/// The phase a session is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    /// Join window, before the first lobby tick
    Lobby,
    /// Join window, after the "starting soon" warning
    Countdown,
    /// A question has been generated and a turn is being assigned
    QuestionActive,
    /// The turn holder has been prompted and the answer timer is running
    AnswerPending,
    /// An outcome is being revealed
    Resolving,
    /// The session is over; it is no longer in the registry
    Finished,
}

/// One step of the reveal sequence that follows an answer or a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Complete the "which is..." notice with the verdict
    Verdict(Outcome),
    /// Withdraw the board and post the final board if the question is over
    Settle(Outcome),
    /// Announce that everyone answered correctly
    Celebrate,
    /// Prompt the next player on the same question
    NextTurn,
    /// Start a new question or declare the winner
    Proceed,
}

/// What a session timer asks the session to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alarm {
    /// Lobby countdown tick (repeating)
    LobbyTick,
    /// The turn holder's time to answer ran out
    AnswerTimeout {
        /// The player who was prompted
        player: PlayerId,
        /// The question the player was prompted for
        question: u32,
    },
    /// Continue the reveal sequence
    Continue(Step),
}

/// How an option is shown on a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnswerMark {
    /// Still available
    Open,
    /// Picked correctly and crossed off
    Picked,
    /// The wrong option (only shown once the question is over)
    Wrong,
}

/// How a player is shown on a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayerMark {
    /// Alive, not yet asked on this question
    Waiting,
    /// The current turn holder
    Answering,
    /// Alive and has answered (or survived the question)
    Answered,
    /// Out of the game
    Eliminated,
}

/// The question and its options as players see them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionSnapshot {
    /// Sequence number, starting at 1
    pub number: u32,
    /// The question text
    pub text: String,
    /// Options in slot order
    pub answers: Vec<(String, AnswerMark)>,
}

/// The roster as players see it, in join order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterSnapshot {
    /// Each player with their status
    pub players: Vec<(PlayerId, PlayerMark)>,
}

/// A full board: the question with every player's status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    /// The current question
    pub question: QuestionSnapshot,
    /// The current roster
    pub roster: RosterSnapshot,
}

/// Prompt addressed to the turn holder
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnPrompt {
    /// The player being asked
    pub player: PlayerId,
    /// Options still open, in slot order
    pub choices: Vec<String>,
    /// Time the player has to answer
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub time_limit: Duration,
}

/// Notices a session posts to its channel
#[skip_serializing_none]
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpdateMessage {
    /// The lobby is open (posted with a join button)
    Lobby {
        /// Roster capacity
        capacity: usize,
        /// Time until the game starts
        #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
        starts_in: Duration,
        /// Time each player has to answer
        #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
        time_limit: Duration,
    },
    /// A player joined the lobby
    PlayerJoined {
        /// The new player
        player: PlayerId,
        /// Roster size after joining
        count: usize,
        /// Roster capacity
        capacity: usize,
    },
    /// The game is about to start
    StartingSoon {
        /// Time left in the join window
        #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
        starts_in: Duration,
    },
    /// The lobby closed with too few players; the game is cancelled
    NotEnoughPlayers,
    /// The board for the current turn
    Board(Board),
    /// The turn holder's prompt (posted with an answer menu)
    TurnPrompt(TurnPrompt),
    /// A player's pick, with the verdict once it is revealed
    Reveal {
        /// The player who answered
        player: PlayerId,
        /// The picked option
        answer: String,
        /// Filled in by an update after the pause
        verdict: Option<Outcome>,
    },
    /// The turn holder did not answer in time
    OutOfTime {
        /// The eliminated player
        player: PlayerId,
    },
    /// The board once a question is over, with the wrong option revealed
    Finalized {
        /// The final board
        board: Board,
        /// Whether every alive player answered correctly
        all_correct: bool,
    },
    /// Everyone answered the question correctly
    AllCorrect,
    /// The last player standing
    Winner {
        /// The winner
        player: PlayerId,
    },
    /// The session was stopped before a winner was found
    Stopped,
}

impl UpdateMessage {
    /// Converts the update message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// The pick that is being revealed
#[derive(Debug, Clone)]
struct Reveal {
    message: MessageId,
    player: PlayerId,
    answer: String,
}

/// One running game, bound to a channel
pub struct Game {
    /// Channel the game runs in
    channel: ChannelId,
    /// Current phase
    state: State,
    /// Sequence number of the current question; `None` before the first one
    question_number: Option<u32>,
    /// Players in join order
    roster: Roster,
    /// The current question
    question: Question,
    /// The player currently prompted, only set while an answer is pending
    turn_holder: Option<PlayerId>,
    /// Timers armed by this session, with the epoch counter
    timers: Timers,
    /// Randomness for question and turn selection
    rng: fastrand::Rng,
    /// The board posted for the current turn
    board_message: Option<MessageId>,
    /// The prompt posted for the current turn
    prompt_message: Option<MessageId>,
    /// The reveal notice of the pick being resolved
    reveal: Option<Reveal>,
}

impl Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("channel", &self.channel)
            .field("instance", &self.timers.instance())
            .field("state", &self.state)
            .field("question_number", &self.question_number)
            .finish_non_exhaustive()
    }
}

// Accessors
impl Game {
    /// Channel the game runs in
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Current phase
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the game is over
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Sequence number of the current question, starting at 1
    pub fn question_number(&self) -> Option<u32> {
        self.question_number
    }

    /// The roster
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The current question
    pub fn question(&self) -> &Question {
        &self.question
    }

    /// The player currently prompted
    pub fn turn_holder(&self) -> Option<PlayerId> {
        self.turn_holder
    }

    /// Current timer epoch
    pub fn epoch(&self) -> u64 {
        self.timers.epoch()
    }

    /// Number of timers currently armed
    pub fn armed_timers(&self) -> usize {
        self.timers.armed_count()
    }

    fn question_snapshot(&self, reveal_wrong: bool) -> QuestionSnapshot {
        QuestionSnapshot {
            number: self.question_number.unwrap_or_default(),
            text: self.question.text.clone(),
            answers: self
                .question
                .answers()
                .map(|(text, record)| {
                    let mark = if reveal_wrong && !record.correct {
                        AnswerMark::Wrong
                    } else if record.picked {
                        AnswerMark::Picked
                    } else {
                        AnswerMark::Open
                    };
                    (text.to_owned(), mark)
                })
                .collect_vec(),
        }
    }

    fn roster_snapshot(&self, finalized: bool) -> RosterSnapshot {
        RosterSnapshot {
            players: self
                .roster
                .iter()
                .map(|player| {
                    let mark = if !player.alive {
                        PlayerMark::Eliminated
                    } else if player.answered || finalized {
                        PlayerMark::Answered
                    } else if Some(player.id) == self.turn_holder {
                        PlayerMark::Answering
                    } else {
                        PlayerMark::Waiting
                    };
                    (player.id, mark)
                })
                .collect_vec(),
        }
    }

    /// Board for the turn in progress
    pub fn board(&self) -> Board {
        Board {
            question: self.question_snapshot(false),
            roster: self.roster_snapshot(false),
        }
    }

    /// Board once the question is over
    pub fn final_board(&self) -> Board {
        Board {
            question: self.question_snapshot(true),
            roster: self.roster_snapshot(true),
        }
    }
}

impl Game {
    /// Creates a game in the lobby state
    ///
    /// # Arguments
    ///
    /// * `channel` - Channel the game runs in
    /// * `instance` - Registry-issued number distinguishing this game from
    ///   earlier games in the same channel
    /// * `rng` - Randomness source for questions and turns
    pub fn new(channel: ChannelId, instance: u64, rng: fastrand::Rng) -> Self {
        Self {
            channel,
            state: State::Lobby,
            question_number: None,
            roster: Roster::default(),
            question: Question::default(),
            turn_holder: None,
            timers: Timers::new(channel, instance),
            rng,
            board_message: None,
            prompt_message: None,
            reveal: None,
        }
    }

    /// Posts the lobby notice and starts the lobby countdown
    ///
    /// The countdown is a repeating timer: the first tick posts a warning,
    /// the second closes the lobby.
    pub fn open_lobby<T: Tunnel, S: Scheduler>(&mut self, ctx: &mut Context<'_, T, S>) {
        ctx.tunnel.notify(
            self.channel,
            &UpdateMessage::Lobby {
                capacity: ctx.options.max_players,
                starts_in: ctx.options.lobby_tick * 2,
                time_limit: ctx.options.time_limit,
            },
            Some(Component::JoinButton),
        );
        self.timers
            .arm_repeating(Alarm::LobbyTick, ctx.options.lobby_tick, ctx.scheduler);
        info!(channel = %self.channel, "lobby opened");
    }

    /// Adds a player to the lobby
    ///
    /// # Returns
    ///
    /// The roster size after the player joined
    ///
    /// # Errors
    ///
    /// * `Precondition::GameInProgress` - The lobby has closed
    /// * `Precondition::AlreadyJoined` - The player is already on the roster
    /// * `Precondition::LobbyFull` - The roster is at capacity
    pub fn join<T: Tunnel, S: Scheduler>(
        &mut self,
        player: PlayerId,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<usize, Precondition> {
        if !matches!(self.state, State::Lobby | State::Countdown) {
            return Err(Precondition::GameInProgress);
        }
        let count = self.roster.add(player, ctx.options.max_players)?;

        ctx.tunnel.notify(
            self.channel,
            &UpdateMessage::PlayerJoined {
                player,
                count,
                capacity: ctx.options.max_players,
            },
            None,
        );
        debug!(channel = %self.channel, %player, count, "player joined");
        Ok(count)
    }

    /// Handles a fired timer
    ///
    /// # Returns
    ///
    /// `Delivery::Stale` if the timer was cancelled, belongs to an earlier
    /// epoch, or targets a turn that has already been decided.
    ///
    /// # Errors
    ///
    /// Generation failures and broken invariants met while advancing.
    pub fn receive_alarm<T: Tunnel, S: Scheduler>(
        &mut self,
        message: &AlarmMessage,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<Delivery, Error> {
        if self.is_finished() || !self.timers.accept(message, ctx.scheduler) {
            debug!(
                channel = %self.channel,
                timer = message.handle.serial,
                epoch = message.epoch,
                current_epoch = self.timers.epoch(),
                "discarded stale alarm"
            );
            return Ok(Delivery::Stale);
        }

        match message.alarm {
            Alarm::LobbyTick => self.lobby_tick(ctx),
            Alarm::AnswerTimeout { player, question } => self.time_out(player, question, ctx),
            Alarm::Continue(step) => self.run_step(step, ctx).map(|()| Delivery::Applied),
        }
    }

    fn lobby_tick<T: Tunnel, S: Scheduler>(
        &mut self,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<Delivery, Error> {
        match self.state {
            State::Lobby => {
                ctx.tunnel.notify(
                    self.channel,
                    &UpdateMessage::StartingSoon {
                        starts_in: ctx.options.lobby_tick,
                    },
                    None,
                );
                self.state = State::Countdown;
                Ok(Delivery::Applied)
            }
            State::Countdown => {
                self.timers.disarm_all(ctx.scheduler);
                if self.roster.len() >= MIN_PLAYER_COUNT {
                    info!(
                        channel = %self.channel,
                        players = self.roster.len(),
                        "game started"
                    );
                    self.next_question(ctx)?;
                } else {
                    ctx.tunnel
                        .notify(self.channel, &UpdateMessage::NotEnoughPlayers, None);
                    info!(
                        channel = %self.channel,
                        players = self.roster.len(),
                        "game cancelled: not enough players"
                    );
                    self.terminate(ctx);
                }
                Ok(Delivery::Applied)
            }
            _ => Ok(Delivery::Stale),
        }
    }

    /// Starts a new question and prompts its first turn holder
    fn next_question<T: Tunnel, S: Scheduler>(
        &mut self,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<(), Error> {
        self.question.clear();
        self.roster.reset_answers();
        let number = self.question_number.map_or(1, |n| n + 1);
        self.question_number = Some(number);

        self.question = Question::generate(ctx.bank, self.roster.alive_count(), &mut self.rng)?;
        self.state = State::QuestionActive;
        debug!(
            channel = %self.channel,
            question = number,
            options = self.question.len(),
            "question generated"
        );

        self.advance_turn(ctx)
    }

    /// Prompts the next eligible player and starts their answer timer
    fn advance_turn<T: Tunnel, S: Scheduler>(
        &mut self,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<(), Error> {
        let player = turn::next_turn(&self.roster, &mut self.rng)?;
        let question = self.question_number.unwrap_or_default();
        self.turn_holder = Some(player);
        self.state = State::AnswerPending;

        self.board_message = Some(ctx.tunnel.notify(
            self.channel,
            &UpdateMessage::Board(self.board()),
            None,
        ));
        self.prompt_message = Some(ctx.tunnel.notify(
            self.channel,
            &UpdateMessage::TurnPrompt(TurnPrompt {
                player,
                choices: self.question.available().map(str::to_owned).collect_vec(),
                time_limit: ctx.options.time_limit,
            }),
            Some(Component::AnswerMenu),
        ));
        self.timers.arm(
            Alarm::AnswerTimeout { player, question },
            ctx.options.time_limit,
            ctx.scheduler,
        );
        debug!(channel = %self.channel, %player, question, "turn started");
        Ok(())
    }

    /// Submits the turn holder's pick
    ///
    /// The outcome is committed immediately, which cancels the answer timer;
    /// the reveal then plays out as a sequence of paced steps.
    ///
    /// # Errors
    ///
    /// * `Precondition::StaleSelection` - The option is not open on the
    ///   current question
    /// * `Precondition::NotYourTurn` - `player` is not the turn holder
    /// * Generation failures and broken invariants when the pacing is zero and
    ///   the reveal runs to the next question immediately
    pub fn submit<T: Tunnel, S: Scheduler>(
        &mut self,
        player: PlayerId,
        text: &str,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<Outcome, Error> {
        let outcome = answer::submit(
            &mut self.roster,
            &mut self.question,
            self.turn_holder,
            player,
            text,
        )?;

        self.timers.disarm_all(ctx.scheduler);
        self.turn_holder = None;
        self.state = State::Resolving;
        if let Some(prompt) = self.prompt_message.take() {
            ctx.tunnel.withdraw(self.channel, prompt);
        }

        let reveal = UpdateMessage::Reveal {
            player,
            answer: text.to_owned(),
            verdict: None,
        };
        self.reveal = Some(Reveal {
            message: ctx.tunnel.notify(self.channel, &reveal, None),
            player,
            answer: text.to_owned(),
        });
        debug!(channel = %self.channel, %player, ?outcome, "answer committed");

        self.pace(Step::Verdict(outcome), ctx)?;
        Ok(outcome)
    }

    /// Eliminates a turn holder who did not answer in time
    ///
    /// Stale if the turn has already been decided: the player answered, is no
    /// longer the turn holder, or the question has moved on.
    fn time_out<T: Tunnel, S: Scheduler>(
        &mut self,
        player: PlayerId,
        question: u32,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<Delivery, Error> {
        let answered = self.roster.get(player).is_none_or(|p| p.answered);
        if self.state != State::AnswerPending
            || self.turn_holder != Some(player)
            || answered
            || self.question_number != Some(question)
        {
            return Ok(Delivery::Stale);
        }

        self.timers.disarm_all(ctx.scheduler);
        self.roster.eliminate(player);
        self.turn_holder = None;
        self.state = State::Resolving;
        for message in [self.board_message.take(), self.prompt_message.take()]
            .into_iter()
            .flatten()
        {
            ctx.tunnel.withdraw(self.channel, message);
        }
        ctx.tunnel
            .notify(self.channel, &UpdateMessage::OutOfTime { player }, None);
        debug!(channel = %self.channel, %player, question, "turn timed out");

        self.pace(Step::Settle(Outcome::Incorrect), ctx)?;
        Ok(Delivery::Applied)
    }

    /// Runs `step` now if pacing is disabled, otherwise after the pacing delay
    fn pace<T: Tunnel, S: Scheduler>(
        &mut self,
        step: Step,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<(), Error> {
        if ctx.options.pacing.is_zero() {
            self.run_step(step, ctx)
        } else {
            self.timers
                .arm(Alarm::Continue(step), ctx.options.pacing, ctx.scheduler);
            Ok(())
        }
    }

    fn run_step<T: Tunnel, S: Scheduler>(
        &mut self,
        step: Step,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<(), Error> {
        match step {
            Step::Verdict(outcome) => {
                if let Some(reveal) = &self.reveal {
                    ctx.tunnel.update(
                        self.channel,
                        reveal.message,
                        &UpdateMessage::Reveal {
                            player: reveal.player,
                            answer: reveal.answer.clone(),
                            verdict: Some(outcome),
                        },
                    );
                }
                self.pace(Step::Settle(outcome), ctx)
            }
            Step::Settle(outcome) => {
                self.reveal = None;
                if let Some(board) = self.board_message.take() {
                    ctx.tunnel.withdraw(self.channel, board);
                }
                match FollowUp::after(outcome, &self.roster) {
                    FollowUp::Eliminated => {
                        self.post_final_board(false, ctx);
                        self.pace(Step::Proceed, ctx)
                    }
                    FollowUp::AllCorrect => {
                        self.post_final_board(true, ctx);
                        self.pace(Step::Celebrate, ctx)
                    }
                    FollowUp::NextTurn => self.pace(Step::NextTurn, ctx),
                }
            }
            Step::Celebrate => {
                ctx.tunnel
                    .notify(self.channel, &UpdateMessage::AllCorrect, None);
                self.pace(Step::Proceed, ctx)
            }
            Step::NextTurn => {
                self.timers.disarm_all(ctx.scheduler);
                self.advance_turn(ctx)
            }
            Step::Proceed => {
                self.timers.disarm_all(ctx.scheduler);
                if self.roster.alive_count() > 1 {
                    self.next_question(ctx)
                } else {
                    self.declare_winner(ctx)?;
                    Ok(())
                }
            }
        }
    }

    fn post_final_board<T: Tunnel, S: Scheduler>(
        &self,
        all_correct: bool,
        ctx: &mut Context<'_, T, S>,
    ) {
        ctx.tunnel.notify(
            self.channel,
            &UpdateMessage::Finalized {
                board: self.final_board(),
                all_correct,
            },
            None,
        );
    }

    /// Declares the single surviving player the winner and ends the game
    ///
    /// # Errors
    ///
    /// `Inconsistency::SurvivorCount` if the number of alive players is not
    /// exactly one. The game is left untouched for the caller to stop.
    pub fn declare_winner<T: Tunnel, S: Scheduler>(
        &mut self,
        ctx: &mut Context<'_, T, S>,
    ) -> Result<PlayerId, Inconsistency> {
        let survivors = self.roster.survivors().map(|p| p.id).collect_vec();
        let [winner] = survivors[..] else {
            return Err(Inconsistency::SurvivorCount(survivors.len()));
        };

        ctx.tunnel
            .notify(self.channel, &UpdateMessage::Winner { player: winner }, None);
        info!(
            channel = %self.channel,
            player = %winner,
            questions = self.question_number.unwrap_or_default(),
            "winner declared"
        );
        self.terminate(ctx);
        Ok(winner)
    }

    /// Cancels every timer and marks the game finished
    ///
    /// Calling it on a finished game does nothing.
    pub fn terminate<T: Tunnel, S: Scheduler>(&mut self, ctx: &mut Context<'_, T, S>) {
        if self.is_finished() {
            return;
        }
        self.timers.disarm_all(ctx.scheduler);
        self.turn_holder = None;
        self.state = State::Finished;
        debug!(channel = %self.channel, "game terminated");
    }

    /// Force-stops the game and tells the channel
    ///
    /// Calling it on a finished game does nothing.
    pub fn stop<T: Tunnel, S: Scheduler>(&mut self, ctx: &mut Context<'_, T, S>) {
        if self.is_finished() {
            return;
        }
        for message in [self.board_message.take(), self.prompt_message.take()]
            .into_iter()
            .flatten()
        {
            ctx.tunnel.withdraw(self.channel, message);
        }
        self.terminate(ctx);
        ctx.tunnel.notify(self.channel, &UpdateMessage::Stopped, None);
        info!(channel = %self.channel, "game stopped");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        bank::{QuestionBank, tests::test_bank},
        config::Options,
        session::tests::{Call, MockTunnel},
        timer::tests::MockScheduler,
    };

    pub(crate) struct Harness {
        pub(crate) bank: QuestionBank,
        pub(crate) options: Options,
        pub(crate) tunnel: MockTunnel,
        pub(crate) scheduler: MockScheduler,
    }

    impl Harness {
        pub(crate) fn new(pacing: Duration) -> Self {
            Self {
                bank: test_bank(),
                options: Options {
                    pacing,
                    ..Options::default()
                },
                tunnel: MockTunnel::default(),
                scheduler: MockScheduler::default(),
            }
        }

        pub(crate) fn ctx(&mut self) -> Context<'_, MockTunnel, MockScheduler> {
            Context::new(&self.bank, &self.options, &self.tunnel, &mut self.scheduler)
        }

        pub(crate) fn pending(&self, predicate: impl Fn(&Alarm) -> bool) -> AlarmMessage {
            self.scheduler
                .pending(predicate)
                .expect("no matching alarm is pending")
        }
    }

    pub(crate) fn assert_invariants(game: &Game) {
        assert_eq!(
            game.roster.alive_count(),
            game.roster.survivors().count(),
            "alive count drifted"
        );
        assert_eq!(
            game.turn_holder.is_some(),
            game.state == State::AnswerPending,
            "turn holder outside of AnswerPending"
        );
        if let Some(holder) = game.turn_holder {
            let player = game.roster.get(holder).unwrap();
            assert!(player.alive && !player.answered);
        }
        if game.question_number.is_some() && !game.is_finished() {
            assert_eq!(game.question.incorrect_count(), 1);
        }
    }

    pub(crate) fn correct_option(game: &Game) -> String {
        game.question
            .answers()
            .find(|(_, record)| record.correct && !record.picked)
            .map(|(text, _)| text.to_owned())
            .unwrap()
    }

    pub(crate) fn wrong_option(game: &Game) -> String {
        game.question
            .answers()
            .find(|(_, record)| !record.correct)
            .map(|(text, _)| text.to_owned())
            .unwrap()
    }

    fn lobby(harness: &mut Harness, players: u64) -> Game {
        let mut game = Game::new(ChannelId::from(1), 0, fastrand::Rng::with_seed(17));
        game.open_lobby(&mut harness.ctx());
        for id in 1..=players {
            game.join(PlayerId::from(id), &mut harness.ctx()).unwrap();
        }
        game
    }

    fn tick(harness: &mut Harness, game: &mut Game) -> Delivery {
        let message = harness.pending(|alarm| *alarm == Alarm::LobbyTick);
        game.receive_alarm(&message, &mut harness.ctx()).unwrap()
    }

    fn started(harness: &mut Harness, players: u64) -> Game {
        let mut game = lobby(harness, players);
        tick(harness, &mut game);
        tick(harness, &mut game);
        harness.tunnel.clear();
        game
    }

    fn time_out(harness: &mut Harness, game: &mut Game) -> Delivery {
        let message = harness.pending(|alarm| matches!(alarm, Alarm::AnswerTimeout { .. }));
        game.receive_alarm(&message, &mut harness.ctx()).unwrap()
    }

    #[test]
    fn test_new_game_is_in_lobby() {
        let game = Game::new(ChannelId::from(1), 0, fastrand::Rng::with_seed(1));
        assert_eq!(game.state(), State::Lobby);
        assert_eq!(game.question_number(), None);
        assert!(game.roster().is_empty());
        assert_invariants(&game);
    }

    #[test]
    fn test_open_lobby_posts_join_button_and_arms_repeating_tick() {
        let mut harness = Harness::new(Duration::ZERO);
        let game = lobby(&mut harness, 0);

        let calls = harness.tunnel.calls.lock().unwrap().clone();
        assert!(matches!(
            &calls[0],
            Call::Notify(_, UpdateMessage::Lobby { capacity: 8, .. }, Some(Component::JoinButton))
        ));
        let scheduled = harness.scheduler.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0.alarm, Alarm::LobbyTick);
        assert_eq!(scheduled[0].1, Duration::from_secs(10));
        assert_eq!(game.armed_timers(), 1);
    }

    #[test]
    fn test_join_rules() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = lobby(&mut harness, 0);

        assert_eq!(game.join(PlayerId::from(1), &mut harness.ctx()), Ok(1));
        assert_eq!(
            game.join(PlayerId::from(1), &mut harness.ctx()),
            Err(Precondition::AlreadyJoined)
        );
        for id in 2..=8 {
            game.join(PlayerId::from(id), &mut harness.ctx()).unwrap();
        }
        assert_eq!(
            game.join(PlayerId::from(9), &mut harness.ctx()),
            Err(Precondition::LobbyFull)
        );
        assert_eq!(game.roster().alive_count(), 8);
        assert!(harness.tunnel.notices().contains(&UpdateMessage::PlayerJoined {
            player: PlayerId::from(8),
            count: 8,
            capacity: 8
        }));
    }

    #[test]
    fn test_join_during_countdown_then_rejected_after_start() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = lobby(&mut harness, 1);
        tick(&mut harness, &mut game);
        assert_eq!(game.state(), State::Countdown);

        assert_eq!(game.join(PlayerId::from(2), &mut harness.ctx()), Ok(2));

        tick(&mut harness, &mut game);
        assert_eq!(
            game.join(PlayerId::from(3), &mut harness.ctx()),
            Err(Precondition::GameInProgress)
        );
        assert_eq!(game.roster().len(), 2);
    }

    #[test]
    fn test_two_ticks_start_first_question() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = lobby(&mut harness, 2);

        assert_eq!(tick(&mut harness, &mut game), Delivery::Applied);
        assert_eq!(game.state(), State::Countdown);
        assert!(harness.tunnel.notices().contains(&UpdateMessage::StartingSoon {
            starts_in: Duration::from_secs(10)
        }));
        assert_eq!(game.armed_timers(), 1);

        assert_eq!(tick(&mut harness, &mut game), Delivery::Applied);
        assert_eq!(game.state(), State::AnswerPending);
        assert_eq!(game.question_number(), Some(1));
        assert_eq!(game.question().len(), 3);
        assert_eq!(game.question().incorrect_count(), 1);
        assert!(game.turn_holder().is_some());
        assert_invariants(&game);

        let notices = harness.tunnel.notices();
        assert!(matches!(notices[notices.len() - 2], UpdateMessage::Board(_)));
        match &notices[notices.len() - 1] {
            UpdateMessage::TurnPrompt(prompt) => {
                assert_eq!(Some(prompt.player), game.turn_holder());
                assert_eq!(prompt.choices.len(), 3);
                assert_eq!(prompt.time_limit, Duration::from_secs(20));
            }
            other => panic!("expected a turn prompt, got {other:?}"),
        }
    }

    #[test]
    fn test_lobby_cancelled_with_one_player() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = lobby(&mut harness, 1);
        tick(&mut harness, &mut game);
        let second_tick = harness.pending(|alarm| *alarm == Alarm::LobbyTick);

        assert_eq!(
            game.receive_alarm(&second_tick, &mut harness.ctx()),
            Ok(Delivery::Applied)
        );

        assert!(game.is_finished());
        assert_eq!(game.armed_timers(), 0);
        assert!(harness
            .tunnel
            .notices()
            .contains(&UpdateMessage::NotEnoughPlayers));
        assert_eq!(
            game.receive_alarm(&second_tick, &mut harness.ctx()),
            Ok(Delivery::Stale)
        );
    }

    #[test]
    fn test_answer_timeout_eliminates_and_moves_on() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);
        let holder = game.turn_holder().unwrap();

        assert_eq!(time_out(&mut harness, &mut game), Delivery::Applied);

        assert!(!game.roster().get(holder).unwrap().alive);
        assert_eq!(game.roster().alive_count(), 2);
        assert_eq!(game.question_number(), Some(2));
        assert_eq!(game.question().len(), 3);
        assert_eq!(game.state(), State::AnswerPending);
        assert_ne!(game.turn_holder(), Some(holder));
        assert!(harness
            .tunnel
            .notices()
            .contains(&UpdateMessage::OutOfTime { player: holder }));
        assert_invariants(&game);
    }

    #[test]
    fn test_timeout_after_answer_is_stale() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);
        let holder = game.turn_holder().unwrap();
        let timeout = harness.pending(|alarm| matches!(alarm, Alarm::AnswerTimeout { .. }));
        let text = correct_option(&game);

        assert_eq!(
            game.submit(holder, &text, &mut harness.ctx()),
            Ok(Outcome::Correct)
        );
        let alive = game.roster().alive_count();

        assert_eq!(
            game.receive_alarm(&timeout, &mut harness.ctx()),
            Ok(Delivery::Stale)
        );
        assert_eq!(game.roster().alive_count(), alive);
        assert!(game.roster().get(holder).unwrap().alive);
        assert_invariants(&game);
    }

    #[test]
    fn test_timeout_for_superseded_turn_is_stale_even_with_current_epoch() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);
        let holder = game.turn_holder().unwrap();
        let question = game.question_number().unwrap();
        let forged = AlarmMessage {
            alarm: Alarm::AnswerTimeout {
                player: holder,
                question: question + 1,
            },
            ..harness.pending(|alarm| matches!(alarm, Alarm::AnswerTimeout { .. }))
        };

        assert_eq!(
            game.receive_alarm(&forged, &mut harness.ctx()),
            Ok(Delivery::Stale)
        );
        assert!(game.roster().get(holder).unwrap().alive);
    }

    #[test]
    fn test_wrong_answer_with_two_players_declares_winner() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 2);
        let holder = game.turn_holder().unwrap();
        let other = game
            .roster()
            .iter()
            .map(|p| p.id)
            .find(|id| *id != holder)
            .unwrap();
        let text = wrong_option(&game);

        assert_eq!(
            game.submit(holder, &text, &mut harness.ctx()),
            Ok(Outcome::Incorrect)
        );

        assert!(!game.roster().get(holder).unwrap().alive);
        assert_eq!(game.roster().alive_count(), 1);
        assert!(game.is_finished());
        assert_eq!(game.armed_timers(), 0);
        let notices = harness.tunnel.notices();
        assert_eq!(
            notices.last(),
            Some(&UpdateMessage::Winner { player: other })
        );
        assert!(notices.iter().any(|notice| matches!(
            notice,
            UpdateMessage::Finalized {
                all_correct: false,
                ..
            }
        )));
    }

    #[test]
    fn test_reveal_is_updated_with_verdict() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);
        let holder = game.turn_holder().unwrap();
        let text = correct_option(&game);

        game.submit(holder, &text, &mut harness.ctx()).unwrap();

        let calls = harness.tunnel.calls.lock().unwrap().clone();
        let reveal_id = calls
            .iter()
            .find_map(|call| match call {
                Call::Notify(id, UpdateMessage::Reveal { verdict: None, .. }, _) => Some(*id),
                _ => None,
            })
            .unwrap();
        assert!(calls.iter().any(|call| matches!(
            call,
            Call::Update(id, UpdateMessage::Reveal { verdict: Some(Outcome::Correct), answer, .. })
                if *id == reveal_id && *answer == text
        )));
    }

    #[test]
    fn test_correct_answer_advances_turn_within_question() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);
        let first = game.turn_holder().unwrap();
        let text = correct_option(&game);

        game.submit(first, &text, &mut harness.ctx()).unwrap();

        assert_eq!(game.question_number(), Some(1));
        assert_eq!(game.state(), State::AnswerPending);
        let second = game.turn_holder().unwrap();
        assert_ne!(second, first);
        assert!(game.question().get(&text).unwrap().picked);
        assert_eq!(game.question().available().count(), 3);

        let prompt = harness
            .tunnel
            .notices()
            .into_iter()
            .rev()
            .find_map(|notice| match notice {
                UpdateMessage::TurnPrompt(prompt) => Some(prompt),
                _ => None,
            })
            .unwrap();
        assert_eq!(prompt.player, second);
        assert!(!prompt.choices.contains(&text));
        assert_invariants(&game);
    }

    #[test]
    fn test_all_correct_starts_new_question() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 2);

        for _ in 0..2 {
            let holder = game.turn_holder().unwrap();
            let text = correct_option(&game);
            game.submit(holder, &text, &mut harness.ctx()).unwrap();
        }

        assert!(!game.is_finished());
        assert_eq!(game.question_number(), Some(2));
        assert_eq!(game.roster().alive_count(), 2);
        assert_eq!(game.question().len(), 3);
        assert!(game.question().answers().all(|(_, record)| !record.picked));
        let notices = harness.tunnel.notices();
        assert!(notices.contains(&UpdateMessage::AllCorrect));
        assert!(notices.iter().any(|notice| matches!(
            notice,
            UpdateMessage::Finalized {
                all_correct: true,
                ..
            }
        )));
        assert_invariants(&game);
    }

    #[test]
    fn test_submit_preconditions_leave_state_untouched() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);
        let holder = game.turn_holder().unwrap();
        let other = game
            .roster()
            .iter()
            .map(|p| p.id)
            .find(|id| *id != holder)
            .unwrap();
        let text = correct_option(&game);
        let epoch = game.epoch();

        assert_eq!(
            game.submit(other, &text, &mut harness.ctx()),
            Err(Error::Precondition(Precondition::NotYourTurn))
        );
        assert_eq!(
            game.submit(holder, "Ceres", &mut harness.ctx()),
            Err(Error::Precondition(Precondition::StaleSelection))
        );
        assert_eq!(game.epoch(), epoch);
        assert_eq!(game.turn_holder(), Some(holder));
        assert_eq!(game.armed_timers(), 1);
    }

    #[test]
    fn test_submit_in_lobby_is_stale() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = lobby(&mut harness, 2);

        assert_eq!(
            game.submit(PlayerId::from(1), "Pluto", &mut harness.ctx()),
            Err(Error::Precondition(Precondition::StaleSelection))
        );
    }

    #[test]
    fn test_paced_reveal_runs_through_alarms() {
        let mut harness = Harness::new(Duration::from_secs(3));
        let mut game = started(&mut harness, 2);
        let holder = game.turn_holder().unwrap();
        let text = wrong_option(&game);

        game.submit(holder, &text, &mut harness.ctx()).unwrap();
        assert_eq!(game.state(), State::Resolving);
        assert_eq!(game.turn_holder(), None);
        assert_invariants(&game);

        let mut steps = Vec::new();
        while !game.is_finished() {
            let message = harness.pending(|alarm| matches!(alarm, Alarm::Continue(_)));
            if let Alarm::Continue(step) = message.alarm {
                steps.push(step);
            }
            assert_eq!(
                game.receive_alarm(&message, &mut harness.ctx()),
                Ok(Delivery::Applied)
            );
        }

        assert_eq!(
            steps,
            vec![
                Step::Verdict(Outcome::Incorrect),
                Step::Settle(Outcome::Incorrect),
                Step::Proceed
            ]
        );
        assert!(matches!(
            harness.tunnel.notices().last(),
            Some(UpdateMessage::Winner { .. })
        ));
    }

    #[test]
    fn test_paced_all_correct_celebrates() {
        let mut harness = Harness::new(Duration::from_secs(3));
        let mut game = started(&mut harness, 2);

        for _ in 0..2 {
            let holder = game.turn_holder().unwrap();
            let text = correct_option(&game);
            game.submit(holder, &text, &mut harness.ctx()).unwrap();
            while game.state() == State::Resolving {
                let message = harness.pending(|alarm| matches!(alarm, Alarm::Continue(_)));
                game.receive_alarm(&message, &mut harness.ctx()).unwrap();
            }
        }

        assert_eq!(game.question_number(), Some(2));
        assert!(harness.tunnel.notices().contains(&UpdateMessage::AllCorrect));
    }

    #[test]
    fn test_stop_during_reveal_makes_steps_stale() {
        let mut harness = Harness::new(Duration::from_secs(3));
        let mut game = started(&mut harness, 3);
        let holder = game.turn_holder().unwrap();
        let text = correct_option(&game);
        game.submit(holder, &text, &mut harness.ctx()).unwrap();
        let step = harness.pending(|alarm| matches!(alarm, Alarm::Continue(_)));

        game.stop(&mut harness.ctx());
        let notices = harness.tunnel.notices().len();

        assert_eq!(
            game.receive_alarm(&step, &mut harness.ctx()),
            Ok(Delivery::Stale)
        );
        game.stop(&mut harness.ctx());
        assert_eq!(harness.tunnel.notices().len(), notices);
        assert!(game.is_finished());
        assert_eq!(game.armed_timers(), 0);
    }

    #[test]
    fn test_declare_winner_requires_single_survivor() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);

        assert_eq!(
            game.declare_winner(&mut harness.ctx()),
            Err(Inconsistency::SurvivorCount(3))
        );
        assert!(!game.is_finished());

        for id in 1..=3 {
            game.roster.eliminate(PlayerId::from(id));
        }
        assert_eq!(
            game.declare_winner(&mut harness.ctx()),
            Err(Inconsistency::SurvivorCount(0))
        );
    }

    #[test]
    fn test_proceed_without_survivors_is_inconsistent() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);
        for id in 1..=3 {
            game.roster.eliminate(PlayerId::from(id));
        }

        assert_eq!(
            game.run_step(Step::Proceed, &mut harness.ctx()),
            Err(Error::Inconsistency(Inconsistency::SurvivorCount(0)))
        );
        assert!(!game.is_finished());
    }

    #[test]
    fn test_boards_mark_players_and_answers() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 3);
        let first = game.turn_holder().unwrap();
        let text = correct_option(&game);
        game.submit(first, &text, &mut harness.ctx()).unwrap();
        let second = game.turn_holder().unwrap();

        let board = game.board();
        assert_eq!(board.question.number, 1);
        assert!(board
            .question
            .answers
            .contains(&(text.clone(), AnswerMark::Picked)));
        assert!(!board
            .question
            .answers
            .iter()
            .any(|(_, mark)| *mark == AnswerMark::Wrong));
        assert!(board.roster.players.contains(&(first, PlayerMark::Answered)));
        assert!(board.roster.players.contains(&(second, PlayerMark::Answering)));
        assert_eq!(
            board
                .roster
                .players
                .iter()
                .filter(|(_, mark)| *mark == PlayerMark::Waiting)
                .count(),
            1
        );

        let final_board = game.final_board();
        assert_eq!(
            final_board
                .question
                .answers
                .iter()
                .filter(|(_, mark)| *mark == AnswerMark::Wrong)
                .count(),
            1
        );
        assert!(final_board
            .roster
            .players
            .iter()
            .all(|(_, mark)| *mark == PlayerMark::Answered));
    }

    #[test]
    fn test_update_message_to_message() {
        let json = UpdateMessage::Winner {
            player: PlayerId::from(5),
        }
        .to_message();

        assert!(json.contains("Winner"));
        assert!(json.contains('5'));
    }

    #[test]
    fn test_invariants_hold_through_a_full_game() {
        let mut harness = Harness::new(Duration::ZERO);
        let mut game = started(&mut harness, 8);
        let mut rng = fastrand::Rng::with_seed(99);

        while !game.is_finished() {
            assert_invariants(&game);
            assert_eq!(game.question().len(), game.roster().alive_count() + 1);
            let holder = game.turn_holder().unwrap();
            match rng.u8(..3) {
                0 => {
                    time_out(&mut harness, &mut game);
                }
                1 => {
                    let text = wrong_option(&game);
                    game.submit(holder, &text, &mut harness.ctx()).unwrap();
                }
                _ => {
                    let text = correct_option(&game);
                    game.submit(holder, &text, &mut harness.ctx()).unwrap();
                }
            }
        }

        assert_eq!(game.roster().alive_count(), 1);
        assert!(matches!(
            harness.tunnel.notices().last(),
            Some(UpdateMessage::Winner { .. })
        ));
    }
}
