//! Admin console session: history plus a timestamped event log.
//!
//! DESIGN
//! ======
//! Every non-blank line records an `Input` event before anything else, so the
//! log reads as a transcript even when the backend fails. `clear` wipes the
//! input and parsed histories but keeps the event log.

#[cfg(test)]
#[path = "console_test.rs"]
mod console_test;

use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use super::command::{CommandTransport, parse_command};
use crate::net::api::ApiError;
use crate::net::types::ParsedCommand;

pub const CLEAR_COMMAND: &str = "clear";
pub const HELP_COMMAND: &str = "help";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleStream {
    Input,
    Output,
    Error,
}

impl ConsoleStream {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Error => "error",
        }
    }
}

/// One line of console transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEvent {
    pub stream: ConsoleStream,
    pub content: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl CommandEvent {
    fn now(stream: ConsoleStream, content: impl Into<String>) -> Self {
        let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        Self { stream, content: content.into(), timestamp }
    }
}

pub struct AdminConsole {
    transport: Arc<dyn CommandTransport>,
    events: Vec<CommandEvent>,
    inputs: Vec<String>,
    parsed: Vec<ParsedCommand>,
}

impl AdminConsole {
    #[must_use]
    pub fn new(transport: Arc<dyn CommandTransport>) -> Self {
        Self { transport, events: Vec::new(), inputs: Vec::new(), parsed: Vec::new() }
    }

    /// Run one console line and append its events to the log.
    pub async fn execute(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.push(ConsoleStream::Input, line);
        self.inputs.push(line.to_owned());
        let parsed = parse_command(line);
        self.parsed.push(parsed.clone());

        if let Err(e) = self.dispatch(parsed).await {
            warn!(error = %e, "admin command failed");
            self.push(ConsoleStream::Error, e.to_string());
        }
    }

    async fn dispatch(&mut self, parsed: ParsedCommand) -> Result<(), ApiError> {
        match parsed.command.as_str() {
            CLEAR_COMMAND => self.clear(),
            HELP_COMMAND => {
                let help = self.help().await?;
                if !help.is_empty() {
                    self.push(ConsoleStream::Output, help);
                }
            }
            _ => {
                debug!(command = %parsed.command, args = parsed.args.len(), "sending admin command");
                let response = self.transport.send(&parsed).await?;
                if let Some(error) = response.error.filter(|e| !e.is_empty()) {
                    self.push(ConsoleStream::Error, error);
                }
                if let Some(output) = response.output.filter(|o| !o.is_empty()) {
                    self.push(ConsoleStream::Output, output);
                }
            }
        }
        Ok(())
    }

    /// `name: description` for every backend command, blank-line separated.
    ///
    /// # Errors
    ///
    /// Returns the transport's [`ApiError`].
    pub async fn help(&self) -> Result<String, ApiError> {
        let commands = self.transport.available_commands().await?;
        Ok(commands
            .iter()
            .map(|c| format!("{}: {}", c.name, c.description))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.parsed.clear();
    }

    #[must_use]
    pub fn input_history(&self) -> &[String] {
        &self.inputs
    }

    #[must_use]
    pub fn last_input(&self) -> Option<&str> {
        self.inputs.last().map(String::as_str)
    }

    #[must_use]
    pub fn last_parsed(&self) -> Option<&ParsedCommand> {
        self.parsed.last()
    }

    #[must_use]
    pub fn events(&self) -> &[CommandEvent] {
        &self.events
    }

    fn push(&mut self, stream: ConsoleStream, content: impl Into<String>) {
        self.events.push(CommandEvent::now(stream, content));
    }
}
