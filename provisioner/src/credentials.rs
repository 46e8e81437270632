//! Credential list parsing for the MES users file.
//!
//! Each line of the users file is classified on its own: a line holding an
//! identity and an eight-digit PIN yields a [`CredentialRecord`], anything
//! else (comments, headers, malformed PINs) is skipped without error. The
//! surviving records are then checked against the fixed-width storage of the
//! generated `MeshUser` table before they reach the header emitter.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Longest identity, in bytes, that fits the `username[16]` field.
pub const MAX_IDENTITY_LEN: usize = 15;

/// Exact number of ASCII digits in a PIN; the `pin[9]` field adds the NUL.
pub const SECRET_LEN: usize = 8;

/// Identity of the account that must always exist on a provisioned board.
pub const DEMO_IDENTITY: &str = "demo";

/// PIN of the always-present demo account.
pub const DEMO_SECRET: &str = "00000000";

static CREDENTIAL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\w+)\s+([0-9]{8})\s*$")
        .unwrap_or_else(|error| panic!("credential line pattern should compile: {error}"))
});

/// A validated identity/PIN pair destined for the generated user table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialRecord {
    identity: String,
    secret: String,
}

impl CredentialRecord {
    /// Create a record from an identity and PIN.
    ///
    /// No validation is performed here; records produced by
    /// [`parse_credentials`] already satisfy the line pattern, and
    /// [`validate_credentials`] enforces the storage width.
    #[must_use]
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// The `("demo", "00000000")` record appended to every run.
    #[must_use]
    pub fn demo() -> Self {
        Self::new(DEMO_IDENTITY, DEMO_SECRET)
    }

    /// The account name.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The eight-digit PIN.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

/// Outcome of classifying a single users-file line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// The line holds an identity and an eight-digit PIN.
    Valid(CredentialRecord),
    /// The line is a comment, header, blank, or otherwise malformed.
    Skipped,
}

/// Classify one line of the users file.
///
/// This never fails: lines that do not match `identity PIN` are reported as
/// [`LineClass::Skipped`].
///
/// # Examples
///
/// ```
/// use mes_provisioner::credentials::{CredentialRecord, LineClass, classify_line};
///
/// assert_eq!(
///     classify_line("  alice 12345678 "),
///     LineClass::Valid(CredentialRecord::new("alice", "12345678"))
/// );
/// assert_eq!(classify_line("# User1 12345678"), LineClass::Skipped);
/// ```
#[must_use]
pub fn classify_line(line: &str) -> LineClass {
    let Some(captures) = CREDENTIAL_LINE.captures(line) else {
        return LineClass::Skipped;
    };
    match (captures.get(1), captures.get(2)) {
        (Some(identity), Some(secret)) => {
            LineClass::Valid(CredentialRecord::new(identity.as_str(), secret.as_str()))
        }
        _ => LineClass::Skipped,
    }
}

/// Extract credential records from users-file lines, preserving input order.
///
/// Non-matching lines are dropped silently.
pub fn parse_credentials<'a, I>(lines: I) -> Vec<CredentialRecord>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .enumerate()
        .filter_map(|(index, line)| match classify_line(line) {
            LineClass::Valid(record) => Some(record),
            LineClass::Skipped => {
                debug!(target: "credentials", "skipping users file line {}", index + 1);
                None
            }
        })
        .collect()
}

/// Reasons a users file is rejected as a whole.
#[derive(Debug, Error)]
pub enum CredentialFormatError {
    /// The file could not be read as UTF-8 text.
    #[error("users file could not be read as text")]
    Unreadable {
        /// The underlying read or decode failure.
        #[source]
        source: std::io::Error,
    },

    /// An identity would be truncated by the `username[16]` field.
    #[error(
        "identity {identity} is {length} bytes; at most {max} fit the username field",
        max = MAX_IDENTITY_LEN
    )]
    IdentityTooLong {
        /// The offending identity.
        identity: String,
        /// Its length in bytes.
        length: usize,
    },
}

/// Reject records that would not fit the generated fixed-width table.
///
/// The PIN width is already guaranteed by the line pattern; this check covers
/// identities, which the pattern leaves unbounded.
///
/// # Errors
///
/// Returns [`CredentialFormatError::IdentityTooLong`] for the first identity
/// longer than [`MAX_IDENTITY_LEN`] bytes.
pub fn validate_credentials(
    records: Vec<CredentialRecord>,
) -> Result<Vec<CredentialRecord>, CredentialFormatError> {
    if let Some(record) = records
        .iter()
        .find(|record| record.identity.len() > MAX_IDENTITY_LEN)
    {
        return Err(CredentialFormatError::IdentityTooLong {
            identity: record.identity.clone(),
            length: record.identity.len(),
        });
    }
    Ok(records)
}

/// Append the mandatory demo account after the parsed records.
///
/// The demo record is added even when an identity named `demo` already
/// exists; duplicates are not merged.
#[must_use]
pub fn with_demo_user(mut records: Vec<CredentialRecord>) -> Vec<CredentialRecord> {
    records.push(CredentialRecord::demo());
    records
}
