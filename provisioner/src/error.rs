//! Error types for the MES provisioner.
//!
//! Every failure of a provisioning run is reported as a [`ProvisionError`].
//! The binary prints the error as a one-line diagnostic and exits with
//! [`ProvisionError::exit_code`]; nothing is retried.

use crate::builder::BuildFailure;
use crate::catalog::CatalogError;
use crate::credentials::CredentialFormatError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Exit status for open failures and rejected users files.
pub const EXIT_INPUT: i32 = 2;

/// Exit status for every other failure.
pub const EXIT_FAILURE: i32 = 1;

/// Errors that can occur while provisioning a system image.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required environment variable is unset or empty.
    #[error("environment variable {name} must be set")]
    MissingEnv {
        /// Name of the variable.
        name: &'static str,
    },

    /// An environment variable holds an unusable value.
    #[error("invalid value for {name}: {reason}")]
    InvalidEnv {
        /// Name of the variable.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An input file could not be opened.
    #[error("unable to open {description} {path}: {source}")]
    InputOpen {
        /// Human-readable role of the file, such as "users text file".
        description: &'static str,
        /// Path that was opened.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An input file was opened but could not be read as text.
    #[error("unable to read {description} {path}: {source}")]
    InputRead {
        /// Human-readable role of the file.
        description: &'static str,
        /// Path that was read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A generated file could not be created or truncated.
    #[error("unable to open {path} for writing: {source}")]
    OutputOpen {
        /// Destination path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A generated file was opened but could not be written in full.
    #[error("unable to write {path}: {source}")]
    OutputWrite {
        /// Destination path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directory for generated files could not be created.
    #[error("unable to create generated directory {path}: {source}")]
    GeneratedDir {
        /// Directory path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The users file was rejected. Individual line problems are not part of
    /// the message; the cause is kept as the error source.
    #[error("users text file is misformatted")]
    CredentialFormat {
        /// What made the batch unusable.
        #[source]
        source: CredentialFormatError,
    },

    /// The default games file has a malformed line or an inconsistent count.
    #[error("default games file is misformatted: {0}")]
    CatalogFormat(#[from] CatalogError),

    /// The external image build failed or timed out.
    #[error("image build failed: {0}")]
    BuildTool(#[from] BuildFailure),

    /// Test stub received an unexpected or mismatched build invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl ProvisionError {
    /// The process exit status this error maps to.
    ///
    /// Open failures and users-file rejection exit with `2`. Everything else,
    /// including unreadable default games files, exits with `1`.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InputOpen { .. }
            | Self::OutputOpen { .. }
            | Self::OutputWrite { .. }
            | Self::GeneratedDir { .. }
            | Self::CredentialFormat { .. } => EXIT_INPUT,
            Self::MissingEnv { .. }
            | Self::InvalidEnv { .. }
            | Self::InputRead { .. }
            | Self::CatalogFormat(_)
            | Self::BuildTool(_) => EXIT_FAILURE,
            #[cfg(any(test, feature = "test-support"))]
            Self::StubMismatch { .. } => EXIT_FAILURE,
        }
    }
}

impl From<CredentialFormatError> for ProvisionError {
    fn from(source: CredentialFormatError) -> Self {
        Self::CredentialFormat { source }
    }
}

/// Result type alias using [`ProvisionError`].
pub type Result<T> = std::result::Result<T, ProvisionError>;
