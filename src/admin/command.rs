//! Console line tokenizer and the command transport.

#[cfg(test)]
#[path = "command_test.rs"]
mod command_test;

use std::collections::BTreeMap;

use reqwest::Method;

use crate::net::api::{ApiError, HttpApi, decode, rejection};
use crate::net::types::{AvailableCommand, AvailableCommands, CommandResponse, KwargValue, ParsedCommand};

pub(crate) const COMMAND_PATH: &str = "/admin/command/";

/// Tokenize a console line on whitespace.
///
/// The first token is the command. Of the rest:
/// - `--key=value` sets `key` to the text between the first and second `=`;
/// - `--key value` consumes the next token when it does not start with `-`;
/// - a bare `--key` or `-k` sets a `true` flag;
/// - anything else is positional.
///
/// A blank line parses to an empty command.
#[must_use]
pub fn parse_command(line: &str) -> ParsedCommand {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((command, rest)) = tokens.split_first() else {
        return ParsedCommand::default();
    };

    let mut args = Vec::new();
    let mut kwargs = BTreeMap::new();
    let mut pos = 0;

    while pos < rest.len() {
        let token = rest[pos];
        pos += 1;

        if let Some(long) = token.strip_prefix("--") {
            let mut parts = long.split('=');
            let key = parts.next().unwrap_or_default().to_owned();
            if let Some(value) = parts.next() {
                kwargs.insert(key, KwargValue::Text(value.to_owned()));
            } else if let Some(next) = rest.get(pos).filter(|t| !t.starts_with('-')) {
                kwargs.insert(key, KwargValue::Text((*next).to_owned()));
                pos += 1;
            } else {
                kwargs.insert(key, KwargValue::Flag(true));
            }
        } else if let Some(short) = token.strip_prefix('-') {
            kwargs.insert(short.to_owned(), KwargValue::Flag(true));
        } else {
            args.push(token.to_owned());
        }
    }

    ParsedCommand { command: (*command).to_owned(), args, kwargs }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Backend side of the console. Enables mocking in tests.
#[async_trait::async_trait]
pub trait CommandTransport: Send + Sync {
    async fn available_commands(&self) -> Result<Vec<AvailableCommand>, ApiError>;
    async fn send(&self, command: &ParsedCommand) -> Result<CommandResponse, ApiError>;
}

#[async_trait::async_trait]
impl CommandTransport for HttpApi {
    async fn available_commands(&self) -> Result<Vec<AvailableCommand>, ApiError> {
        let listing: AvailableCommands = self.get_json(COMMAND_PATH).await?;
        Ok(listing.available_commands)
    }

    async fn send(&self, command: &ParsedCommand) -> Result<CommandResponse, ApiError> {
        let builder = self.request(Method::POST, COMMAND_PATH).await.json(command);
        let (status, body) = Self::execute(builder).await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body));
        }
        decode(&body)
    }
}
