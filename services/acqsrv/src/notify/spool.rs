//! Durable digest spool
//!
//! Notifications waiting for delivery live in a plain text file so a crash
//! or restart never loses them.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ErrorExt, Result};

#[derive(Debug, Clone)]
pub struct DigestSpool {
    path: PathBuf,
}

impl DigestSpool {
    /// Open the spool at `path`, creating its directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).io_error("create spool directory")?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry
    pub fn append(&self, entry: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .io_error("open spool")?;
        writeln!(file, "{entry}").io_error("append spool")
    }

    /// Current contents without consuming them
    pub fn peek(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.peek().map(|c| c.trim().is_empty()).unwrap_or(true)
    }

    /// Remove and return everything spooled, `None` when empty
    pub fn take(&self) -> Result<Option<String>> {
        let content = self.peek()?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        fs::write(&self.path, "").io_error("truncate spool")?;
        Ok(Some(content))
    }

    /// Put an undelivered payload back in front of newer entries
    pub fn prepend(&self, payload: &str) -> Result<()> {
        let newer = self.peek()?;
        let mut combined = String::with_capacity(payload.len() + newer.len() + 1);
        combined.push_str(payload);
        if !payload.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&newer);
        fs::write(&self.path, combined).io_error("rewrite spool")
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_take_and_prepend() {
        let dir = TempDir::new().unwrap();
        let spool = DigestSpool::open(dir.path().join("spool/digest")).unwrap();
        assert!(spool.is_empty());
        assert_eq!(spool.take().unwrap(), None);

        spool.append("first").unwrap();
        spool.append("second").unwrap();
        let payload = spool.take().unwrap().unwrap();
        assert_eq!(payload, "first\nsecond\n");
        assert!(spool.is_empty());

        spool.append("third").unwrap();
        spool.prepend(&payload).unwrap();
        assert_eq!(spool.peek().unwrap(), "first\nsecond\nthird\n");
    }
}
