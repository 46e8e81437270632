//! Generated artefact emission.
//!
//! An [`Artefact`] pairs a destination path with fully rendered contents. Each
//! artefact is written in one pass and closed before the next one is touched;
//! an existing file at the destination is truncated and replaced.

use crate::error::{ProvisionError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

/// A rendered file waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artefact {
    path: Utf8PathBuf,
    contents: String,
}

impl Artefact {
    /// Pair a destination path with its rendered contents.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Rendered contents.
    #[must_use]
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Write the artefact, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::OutputOpen`] if the destination cannot be
    /// created, or [`ProvisionError::OutputWrite`] if writing fails part way.
    pub fn write(&self) -> Result<()> {
        let mut file = File::create(&self.path).map_err(|source| ProvisionError::OutputOpen {
            path: self.path.clone(),
            source,
        })?;

        file.write_all(self.contents.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ProvisionError::OutputWrite {
                path: self.path.clone(),
                source,
            })?;

        debug!(target: "artefact", "wrote {} bytes to {}", self.contents.len(), self.path);
        Ok(())
    }

    /// Confirm the destination could be written without touching it.
    ///
    /// An existing file is opened for appending and closed unchanged. For a
    /// missing file a scratch file is created and removed in the parent
    /// directory instead.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::OutputOpen`] if the destination is a
    /// directory or cannot be opened for writing.
    pub fn check_writable(&self) -> Result<()> {
        let open_failure = |source| ProvisionError::OutputOpen {
            path: self.path.clone(),
            source,
        };

        if self.path.is_dir() {
            return Err(open_failure(io::Error::new(
                io::ErrorKind::IsADirectory,
                "is a directory",
            )));
        }

        if self.path.exists() {
            OpenOptions::new()
                .append(true)
                .open(&self.path)
                .map_err(open_failure)?;
        } else {
            let parent = self
                .path
                .parent()
                .filter(|parent| !parent.as_str().is_empty())
                .unwrap_or_else(|| Utf8Path::new("."));
            tempfile::NamedTempFile::new_in(parent).map_err(open_failure)?;
        }

        debug!(target: "artefact", "{} is writable", self.path);
        Ok(())
    }
}

/// Create the generated-files directory and any missing parents.
///
/// # Errors
///
/// Returns [`ProvisionError::GeneratedDir`] if the directory cannot be created.
pub fn ensure_generated_dir(dir: &Utf8Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| ProvisionError::GeneratedDir {
        path: dir.to_owned(),
        source,
    })
}
