//! Console host for the elimination game.
//!
//! Reads commands from stdin and prints every notice the engine posts to
//! stdout, so a whole game can be played from a terminal.

use std::{
    env,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{Context, bail};
use elimination::{
    UpdateMessage,
    answer::Outcome,
    bank::QuestionBank,
    config::Options,
    error::{Error, Precondition},
    game::{AnswerMark, Board, PlayerMark},
    player::{ChannelId, PlayerId},
    runtime::{Command, Driver, Reply, RequestError},
    session::{Component, MessageId, Tunnel},
};
use itertools::Itertools;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path =
        env::var("ELIMINATION_CONFIG_PATH").unwrap_or_else(|_| "config/options.json".into());
    let options = Options::load(Path::new(&config_path));

    let bank_path =
        env::var("ELIMINATION_QUESTIONS_PATH").unwrap_or_else(|_| "questions.json".into());
    let bank = QuestionBank::load(Path::new(&bank_path))
        .with_context(|| format!("loading question bank from {bank_path}"))?;

    let (driver, handle) = Driver::new(bank, options, ConsoleTunnel::default());
    let driver = tokio::spawn(driver.run());
    info!("ready; commands: start <channel> | stop <channel> | join <channel> <player> | answer <channel> <player> <option>");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("⚠️ {err}");
                continue;
            }
        };
        match handle.request(command).await {
            Ok(reply) => println!("{}", describe_reply(reply)),
            Err(err) => println!("{}", describe_error(&err)),
        }
    }

    drop(handle);
    driver.await.context("joining game driver")?;
    Ok(())
}

/// Configure tracing subscribers; logs go to stderr so they don't mix with
/// the game transcript.
fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_command(line: &str) -> anyhow::Result<Command> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let mut channel = || -> anyhow::Result<ChannelId> {
        words
            .next()
            .context("missing channel")?
            .parse()
            .context("channel must be a number")
    };

    let command = match verb {
        "start" => Command::Start {
            channel: channel()?,
        },
        "stop" => Command::Stop {
            channel: channel()?,
        },
        "join" => {
            let channel = channel()?;
            Command::Join {
                channel,
                player: parse_player(words.next())?,
            }
        }
        "answer" => {
            let channel = channel()?;
            let player = parse_player(words.next())?;
            let text = words.join(" ");
            if text.is_empty() {
                bail!("missing option");
            }
            Command::Answer {
                channel,
                player,
                text,
            }
        }
        other => bail!("unknown command `{other}`"),
    };
    Ok(command)
}

fn parse_player(word: Option<&str>) -> anyhow::Result<PlayerId> {
    word.context("missing player")?
        .parse()
        .context("player must be a number")
}

fn describe_reply(reply: Reply) -> String {
    match reply {
        Reply::Started => "👍 Game started.".to_owned(),
        Reply::Stopped => "🛑 Game has been stopped.".to_owned(),
        Reply::Joined { count } => format!("👍 Joined ({count} players)."),
        Reply::Answered(_) => "🎁 Answer locked in.".to_owned(),
    }
}

fn describe_error(err: &RequestError) -> String {
    match err {
        RequestError::Game(Error::Precondition(Precondition::NotYourTurn)) => {
            "⛔ It is not your turn to answer!".to_owned()
        }
        RequestError::Game(Error::Precondition(precondition)) => format!("⚠️ {precondition}"),
        other => format!("❗ {other}"),
    }
}

/// Prints notices to stdout
#[derive(Debug, Default)]
struct ConsoleTunnel {
    next_id: AtomicU64,
}

impl Tunnel for ConsoleTunnel {
    fn notify(
        &self,
        channel: ChannelId,
        message: &UpdateMessage,
        component: Option<Component>,
    ) -> MessageId {
        let id = MessageId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        println!("[#{channel} msg {id}]\n{}", render(message));
        match (component, message) {
            (Some(Component::JoinButton), _) => println!("[👍 Join game]"),
            (Some(Component::AnswerMenu), UpdateMessage::TurnPrompt(prompt)) => println!(
                "[Select an answer: {}]",
                prompt.choices.iter().map(|choice| format!("🎁 {choice}")).join(" | ")
            ),
            _ => {}
        }
        id
    }

    fn update(&self, channel: ChannelId, id: MessageId, message: &UpdateMessage) {
        println!("[#{channel} msg {id} edited]\n{}", render(message));
    }

    fn withdraw(&self, channel: ChannelId, id: MessageId) {
        println!("[#{channel} msg {id} deleted]");
    }
}

fn mention(player: PlayerId) -> String {
    format!("<@{player}>")
}

fn render_board(board: &Board, wrong: &str) -> String {
    let answers = board
        .question
        .answers
        .iter()
        .map(|(text, mark)| match mark {
            AnswerMark::Open => format!("🎁 {text}"),
            AnswerMark::Picked => format!("☑️ ~~{text}~~"),
            AnswerMark::Wrong => format!("{wrong} {text}"),
        })
        .join("\n");
    let players = board
        .roster
        .players
        .iter()
        .map(|(player, mark)| match mark {
            PlayerMark::Eliminated => format!("💀 ~~{}~~", mention(*player)),
            PlayerMark::Answered => format!("✅ {}", mention(*player)),
            PlayerMark::Answering => format!("🤔 {}", mention(*player)),
            PlayerMark::Waiting => format!("❓ {}", mention(*player)),
        })
        .join("\n");
    format!(
        "Question {}: {}\nAnswers:\n{answers}\nPlayers:\n{players}",
        board.question.number, board.question.text
    )
}

fn render(message: &UpdateMessage) -> String {
    match message {
        UpdateMessage::Lobby {
            capacity,
            starts_in,
            time_limit,
        } => format!(
            "Process of Elimination\nGame will begin in {} seconds!\n\nRules: A multiple choice \
             question will be presented - however, only 1 answer is wrong. Players are randomly \
             chosen one at a time to answer the question. Once an answer is selected, it cannot \
             be used by other answerers. Picking the wrong answer results in elimination. The \
             time limit to pick an answer is {} seconds. Up to {capacity} players can join.\n\n\
             Last player standing wins! Good luck!",
            starts_in.as_secs(),
            time_limit.as_secs()
        ),
        UpdateMessage::PlayerJoined {
            player,
            count,
            capacity,
        } => format!("{} has joined the game! ({count}/{capacity})", mention(*player)),
        UpdateMessage::StartingSoon { starts_in } => {
            format!("Game starts in {} seconds!", starts_in.as_secs())
        }
        UpdateMessage::NotEnoughPlayers => {
            "Not enough players have joined. The game has been cancelled.".to_owned()
        }
        UpdateMessage::Board(board) => render_board(board, "🎁"),
        UpdateMessage::TurnPrompt(prompt) => format!(
            "{} Your turn to answer! ({} seconds)",
            mention(prompt.player),
            prompt.time_limit.as_secs()
        ),
        UpdateMessage::Reveal {
            player,
            answer,
            verdict,
        } => {
            let reveal = format!("{} chose **{answer}**, which is...", mention(*player));
            match verdict {
                None => reveal,
                Some(Outcome::Correct) => {
                    format!("{reveal}\n\n✅ **Correct!** ✅")
                }
                Some(Outcome::Incorrect) => {
                    format!("{reveal}\n\n💥💥 **INCORRECT!!!** 💥💥")
                }
            }
        }
        UpdateMessage::OutOfTime { player } => {
            format!("**💥💥 {} ran out of time!💥💥**", mention(*player))
        }
        UpdateMessage::Finalized { board, all_correct } => {
            render_board(board, if *all_correct { "❌" } else { "💥" })
        }
        UpdateMessage::AllCorrect => "**😃 Everyone got the question right!**".to_owned(),
        UpdateMessage::Winner { player } => format!(
            "**🥳 Congratulations {}! You are the winner!**",
            mention(*player)
        ),
        UpdateMessage::Stopped => "🛑 Game has been stopped.".to_owned(),
    }
}
