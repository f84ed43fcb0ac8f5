//! Command source port (trait).
//! Defines how the host receives user intent without coupling to stdin.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Watch a different stylesheet.
    Retarget(PathBuf),
    /// Reload the current stylesheet without waiting for a change.
    Reload,
    Quit,
}

impl HostCommand {
    /// Parse one line of user input. Blank lines yield `None`.
    ///
    /// `q`, `quit`, `exit`, `r` and `reload` are reserved. A stylesheet
    /// with one of those names needs a path prefix, e.g. `./r`.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "q" | "quit" | "exit" => Some(HostCommand::Quit),
            "r" | "reload" => Some(HostCommand::Reload),
            path => Some(HostCommand::Retarget(PathBuf::from(path.replace('\\', "/")))),
        }
    }
}

/// Port for receiving host commands.
pub trait CommandSource {
    /// Poll for a command with timeout.
    /// Returns None if nothing arrived within the timeout.
    fn poll_command(&self, timeout: Duration) -> Result<Option<HostCommand>>;
}
