use std::str::FromStr;

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader, stdin},
    sync::mpsc,
};
use tracing::{debug, warn};

/// Console commands, one per line on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Poll the feed now instead of waiting for the next tick.
    Refresh,
    Remove(String),
    /// Print the flight's description and recent path.
    Track(String),
    List,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum CommandError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("'{0}' needs a flight id")]
    MissingFlightId(&'static str),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let Some(verb) = parts.next() else {
            return Err(CommandError::Empty);
        };
        let flight_id = |name: &'static str, arg: Option<&str>| {
            arg.map(str::to_string)
                .ok_or(CommandError::MissingFlightId(name))
        };
        match verb.to_ascii_lowercase().as_str() {
            "refresh" | "r" => Ok(Command::Refresh),
            "remove" | "rm" => Ok(Command::Remove(flight_id("remove", parts.next())?)),
            "track" | "t" => Ok(Command::Track(flight_id("track", parts.next())?)),
            "list" | "ls" => Ok(Command::List),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Reads commands from stdin until it closes or the receiver is dropped.
pub(crate) async fn read_commands(commands: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed, no more commands");
                return;
            }
            Err(e) => {
                warn!("Failed to read command: {}", e);
                return;
            }
        };
        match line.parse::<Command>() {
            Ok(command) => {
                if commands.send(command).await.is_err() {
                    return;
                }
            }
            Err(CommandError::Empty) => {}
            Err(e) => warn!("{}", e),
        }
    }
}
