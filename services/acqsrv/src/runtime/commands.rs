//! File-backed command injection queue
//!
//! External tools append `command<TAB>source` lines; the loop drains the
//! file at each cycle boundary and relays the commands to the PIC.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{AcqError, ErrorExt, Result};

const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    pub command: String,
    pub source: String,
}

impl QueuedCommand {
    /// Parse one queue line; blank lines yield nothing
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(2, '\t');
        let command = parts.next()?.trim();
        if command.is_empty() {
            return None;
        }
        let source = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SOURCE);
        Some(Self {
            command: command.to_string(),
            source: source.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommandQueue {
    path: PathBuf,
    announce: HashSet<String>,
}

impl CommandQueue {
    pub fn new(path: impl Into<PathBuf>, announce_sources: &[String]) -> Self {
        Self {
            path: path.into(),
            announce: announce_sources.iter().cloned().collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take every queued command and truncate the file
    pub fn drain(&self) -> Result<Vec<QueuedCommand>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AcqError::io(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )))
            },
        };
        if content.is_empty() {
            return Ok(Vec::new());
        }
        fs::write(&self.path, "")
            .io_error(&format!("cannot truncate {}", self.path.display()))?;
        Ok(content.lines().filter_map(QueuedCommand::parse).collect())
    }

    /// Commands from these sources are reported at info level
    pub fn announces(&self, source: &str) -> bool {
        self.announce.contains(source)
    }
}
