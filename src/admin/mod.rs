//! Admin command console.
//!
//! SYSTEM CONTEXT
//! ==============
//! Admins drive backend maintenance through a line-oriented console. Lines
//! are tokenized locally by [`command::parse_command`] and posted to
//! `/admin/command/`; [`console::AdminConsole`] keeps the input history and
//! the timestamped event log rendered by the CLI REPL.

pub mod command;
pub mod console;
