//! Single-file scratch slot holding the most recent raw agent output.
//!
//! Every write replaces the previous content as a whole: the text lands in a
//! uniquely named sibling temp file first and is renamed over the slot, so a
//! reader never observes a half-written transcript, even with concurrent
//! writers.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchSlot {
    path: PathBuf,
}

impl ScratchSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the slot content with `content`, creating parent directories on demand.
    pub fn overwrite(&self, content: &str) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            bail!("scratch slot path cannot be empty");
        }
        if self.path.is_dir() {
            bail!("scratch slot '{}' is a directory", self.path.display());
        }

        let parent_dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("failed to create {}", parent_dir.display()))?;

        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("scratch");
        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".partial")
            .tempfile_in(parent_dir)
            .with_context(|| format!("failed to stage scratch slot in {}", parent_dir.display()))?;
        staged
            .write_all(content.as_bytes())
            .with_context(|| format!("failed to stage {}", staged.path().display()))?;
        staged
            .persist(&self.path)
            .map_err(|error| error.error)
            .with_context(|| {
                format!(
                    "failed to move staged output into scratch slot {}",
                    self.path.display()
                )
            })?;
        Ok(())
    }

    /// Reads the slot back; a slot that was never written is an error.
    pub fn read(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read scratch slot {}", self.path.display()))
    }
}
