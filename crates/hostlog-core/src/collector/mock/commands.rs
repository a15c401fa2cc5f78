//! Scripted command runner for testing probes that shell out.

use crate::collector::traits::CommandRunner;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Canned result for one command line.
#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Fail(io::ErrorKind),
}

/// Command runner that answers from a table keyed by the full command line
/// (`"vcgencmd measure_volts core"`). Unknown commands fail with `NotFound`,
/// as a missing binary would.
#[derive(Debug, Clone, Default)]
pub struct MockCommands {
    replies: Arc<RwLock<HashMap<String, Reply>>>,
}

impl MockCommands {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, command_line: &str, reply: Reply) {
        self.replies
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(command_line.to_string(), reply);
    }

    /// Makes `command_line` succeed with `stdout`.
    pub fn respond(&self, command_line: &str, stdout: impl Into<String>) {
        self.insert(command_line, Reply::Stdout(stdout.into()));
    }

    /// Makes `command_line` fail with an error of `kind`.
    pub fn fail(&self, command_line: &str, kind: io::ErrorKind) {
        self.insert(command_line, Reply::Fail(kind));
    }
}

impl CommandRunner for MockCommands {
    fn run(&self, program: &str, args: &[&str], _timeout: Duration) -> io::Result<String> {
        let mut command_line = program.to_string();
        for arg in args {
            command_line.push(' ');
            command_line.push_str(arg);
        }

        let replies = self.replies.read().unwrap_or_else(|e| e.into_inner());
        match replies.get(&command_line) {
            Some(Reply::Stdout(out)) => Ok(out.clone()),
            Some(Reply::Fail(kind)) => Err(io::Error::new(*kind, command_line)),
            None => Err(io::Error::new(io::ErrorKind::NotFound, command_line)),
        }
    }
}
