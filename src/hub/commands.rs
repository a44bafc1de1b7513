//! Client command parsing and dispatch.
//!
//! Each input line is one command. The first space-separated token picks the
//! command; `s` takes a comma-separated destination list and a free-text
//! remainder:
//!
//! ```text
//! a                  -> own id
//! w                  -> other connected ids
//! s 2,3 hello there  -> deliver "hello there" to sessions 2 and 3
//! d                  -> disconnect
//! ?                  -> help
//! ```
//!
//! Destination lists are validated in full before anything is delivered.

use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;

use super::registry::SessionRegistry;
use crate::constants::HELP_TEXT;
use crate::error::CommandError;
use crate::message::Message;
use crate::session::{SessionHandle, SessionId};

/// A parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Blank line, ignored.
    Empty,
    /// `a`: ask for own id.
    Identity,
    /// `w`: ask for the other connected clients.
    List,
    /// `s <destinations> <body>`: send a message.
    Send {
        /// Raw comma-separated destination list.
        destinations: &'a str,
        /// Message text, may contain spaces.
        body: &'a str,
    },
    /// `d`: disconnect.
    Disconnect,
    /// `?`: show help.
    Help,
}

impl<'a> Command<'a> {
    /// Parse a trimmed input line.
    ///
    /// Only the first token is significant for commands other than `s`;
    /// trailing words after `a`, `w`, `d` and `?` are ignored.
    pub fn parse(line: &'a str) -> Result<Self, CommandError> {
        let mut parts = line.splitn(3, ' ');
        let name = parts.next().unwrap_or_default();

        match name {
            "" => Ok(Self::Empty),
            "a" => Ok(Self::Identity),
            "w" => Ok(Self::List),
            "s" => match (parts.next(), parts.next()) {
                (Some(destinations), Some(body)) => Ok(Self::Send { destinations, body }),
                _ => Err(CommandError::InvalidParameters),
            },
            "d" => Ok(Self::Disconnect),
            "?" => Ok(Self::Help),
            _ => Err(CommandError::Unhandled),
        }
    }
}

/// Validate a destination list against the sessions connected at call time.
///
/// All-or-nothing: the first bad token fails the whole list. Duplicates
/// collapse, and the result is ordered by id.
pub fn parse_destinations(
    sender: SessionId,
    input: &str,
    connected: &BTreeSet<SessionId>,
) -> Result<BTreeSet<SessionId>, CommandError> {
    let mut destinations = BTreeSet::new();

    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let id = parse_id(token)?;
        if id == sender {
            return Err(CommandError::SelfMessage);
        }
        if !connected.contains(&id) {
            return Err(CommandError::NotConnected(id));
        }
        destinations.insert(id);
    }

    if destinations.is_empty() {
        return Err(CommandError::NoClients);
    }
    Ok(destinations)
}

/// Plain unsigned decimal; `u64::from_str` would also take a leading `+`.
fn parse_id(token: &str) -> Result<SessionId, CommandError> {
    if !token.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(CommandError::invalid_destination(token, "invalid digit found in string"));
    }
    token
        .parse::<u64>()
        .map(SessionId)
        .map_err(|e| CommandError::invalid_destination(token, &e))
}

fn sent_summary(count: usize) -> String {
    if count == 1 {
        "Sent to 1 client".to_string()
    } else {
        format!("Sent to {count} clients")
    }
}

/// Executes commands on behalf of sessions against the hub's registry.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'a> {
    registry: &'a SessionRegistry,
    shutdown: &'a CancellationToken,
}

impl<'a> Dispatcher<'a> {
    /// Dispatcher over `registry`; every enqueue also gives up on `shutdown`.
    pub fn new(registry: &'a SessionRegistry, shutdown: &'a CancellationToken) -> Self {
        Self { registry, shutdown }
    }

    /// Parse and run one trimmed line from `sender`.
    pub async fn handle_line(&self, sender: &SessionHandle, line: &str) -> Result<(), CommandError> {
        let command = Command::parse(line)?;
        self.execute(sender, command).await
    }

    /// Run a parsed command.
    pub async fn execute(
        &self,
        sender: &SessionHandle,
        command: Command<'_>,
    ) -> Result<(), CommandError> {
        match command {
            Command::Empty => Ok(()),
            Command::Identity => self.reply(sender, Message::response(sender.id().to_string())).await,
            Command::List => {
                let others = self.registry.others(sender.id());
                let text = if others.is_empty() {
                    "No other clients seem to have connected.".to_string()
                } else {
                    let list: Vec<String> = others.iter().map(ToString::to_string).collect();
                    format!("List of clients: {}", list.join(","))
                };
                self.reply(sender, Message::response(text)).await
            }
            Command::Send { destinations, body } => {
                let connected = self.registry.ids();
                let targets = parse_destinations(sender.id(), destinations, &connected)?;

                for &id in &targets {
                    self.deliver(id, Message::direct(sender.id(), body)).await?;
                }
                log::debug!("[{}] Sent to {:?}", sender.id(), targets);

                self.reply(sender, Message::response(sent_summary(targets.len()))).await
            }
            Command::Disconnect => {
                let ack = self.reply(sender, Message::response("Disconnecting...")).await;
                sender.cancel();
                ack
            }
            Command::Help => self.reply(sender, Message::response(HELP_TEXT)).await,
        }
    }

    /// Queue `message` for the session that issued the command.
    pub async fn reply(&self, sender: &SessionHandle, message: Message) -> Result<(), CommandError> {
        sender.send(message, self.shutdown).await
    }

    /// Queue `message` for session `id`, failing if it is gone.
    async fn deliver(&self, id: SessionId, message: Message) -> Result<(), CommandError> {
        let target = self
            .registry
            .get(id)
            .ok_or(CommandError::ClientNotConnected(id))?;
        target.send(message, self.shutdown).await
    }
}
