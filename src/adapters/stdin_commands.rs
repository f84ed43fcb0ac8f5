//! Stdin implementation of the CommandSource port.
//! A reader thread forwards parsed lines; polling never blocks on stdin.

use crate::ports::{CommandSource, HostCommand};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

pub struct StdinCommands {
    rx: Receiver<HostCommand>,
}

impl StdinCommands {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stylewatch-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if let Some(command) = HostCommand::parse(&line) {
                        if tx.send(command).is_err() {
                            return;
                        }
                    }
                }
                // EOF behaves like quit.
                let _ = tx.send(HostCommand::Quit);
            })
            .context("Failed to spawn stdin reader")?;
        Ok(Self { rx })
    }
}

impl CommandSource for StdinCommands {
    fn poll_command(&self, timeout: Duration) -> Result<Option<HostCommand>> {
        match self.rx.recv_timeout(timeout) {
            Ok(command) => Ok(Some(command)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(Some(HostCommand::Quit)),
        }
    }
}
