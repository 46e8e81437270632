//! Default games catalogue parsing.
//!
//! The default games file lists the games that must be installed for a board
//! to boot, one `name major.minor` pair per line. Blank lines are ignored.
//! Unlike the users file, a malformed line is an error: the firmware cannot
//! boot with a partially generated catalogue.

use log::debug;
use std::fmt;
use thiserror::Error;

/// A game that ships installed by default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogEntry {
    name: String,
    major: String,
    minor: String,
}

impl CatalogEntry {
    /// Create an entry from its name and version components.
    #[must_use]
    pub fn new(name: impl Into<String>, major: impl Into<String>, minor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            major: major.into(),
            minor: minor.into(),
        }
    }

    /// The game name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The major version, exactly as written in the file.
    #[must_use]
    pub fn major(&self) -> &str {
        &self.major
    }

    /// The minor version, exactly as written in the file.
    #[must_use]
    pub fn minor(&self) -> &str {
        &self.minor
    }
}

impl fmt::Display for CatalogEntry {
    /// Formats the entry as the firmware expects it: `name-vmajor.minor`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}.{}", self.name, self.major, self.minor)
    }
}

/// Why a single catalogue line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CatalogLineFault {
    /// The line has a name but no version token.
    #[error("missing version token")]
    MissingVersion,

    /// The version token is not `major.minor` with exactly one dot.
    #[error("version is not of the form major.minor")]
    VersionNotDotted,

    /// A token contains `"` or `\`, which would break the generated literal.
    #[error("contains a quote or backslash")]
    UnsafeCharacter,
}

/// A catalogue line that does not have the `name major.minor` shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line_number} ({line:?}): {fault}")]
pub struct MalformedCatalogLine {
    /// One-based line number within the file.
    pub line_number: usize,
    /// The offending line as read.
    pub line: String,
    /// What is wrong with it.
    pub fault: CatalogLineFault,
}

/// Errors produced while turning a default games file into a catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A line could not be parsed.
    #[error(transparent)]
    Malformed(#[from] MalformedCatalogLine),

    /// The independent non-blank line count disagrees with the parsed entries.
    #[error("counted {counted} non-blank lines but parsed {parsed} entries")]
    CountMismatch {
        /// Non-blank lines in the raw file.
        counted: usize,
        /// Entries produced by the parser.
        parsed: usize,
    },
}

/// A parsed default games file together with its declared game count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultCatalog {
    entries: Vec<CatalogEntry>,
    declared_count: usize,
}

impl DefaultCatalog {
    /// Parse the default games file and cross-check its entry count.
    ///
    /// The count written to the generated header comes from
    /// [`count_catalog_lines`], which looks only at the raw text. It must agree
    /// with the number of parsed entries.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Malformed`] for the first bad line, or
    /// [`CatalogError::CountMismatch`] if the two counts diverge.
    ///
    /// # Examples
    ///
    /// ```
    /// use mes_provisioner::catalog::DefaultCatalog;
    ///
    /// let catalog = DefaultCatalog::parse("chess 1.2\n\nbattleship 3.0\n")?;
    /// assert_eq!(catalog.declared_count(), 2);
    /// let names: Vec<String> = catalog.entries().iter().map(ToString::to_string).collect();
    /// assert_eq!(names, ["chess-v1.2", "battleship-v3.0"]);
    /// # Ok::<(), mes_provisioner::catalog::CatalogError>(())
    /// ```
    pub fn parse(contents: &str) -> Result<Self, CatalogError> {
        let entries = parse_catalog(contents)?;
        let declared_count = count_catalog_lines(contents);

        if declared_count != entries.len() {
            return Err(CatalogError::CountMismatch {
                counted: declared_count,
                parsed: entries.len(),
            });
        }

        Ok(Self {
            entries,
            declared_count,
        })
    }

    /// The entries in file order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// The count of non-blank lines in the source file.
    #[must_use]
    pub fn declared_count(&self) -> usize {
        self.declared_count
    }
}

/// Returns true for lines the catalogue ignores.
fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Count the non-blank lines of a default games file.
#[must_use]
pub fn count_catalog_lines(contents: &str) -> usize {
    contents.lines().filter(|line| !is_blank(line)).count()
}

/// Parse every non-blank line of a default games file, in order.
///
/// # Errors
///
/// Returns [`MalformedCatalogLine`] for the first line lacking a name and a
/// `major.minor` version.
pub fn parse_catalog(contents: &str) -> Result<Vec<CatalogEntry>, MalformedCatalogLine> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !is_blank(line))
        .map(|(index, line)| {
            parse_line(line).map_err(|fault| MalformedCatalogLine {
                line_number: index + 1,
                line: line.to_owned(),
                fault,
            })
        })
        .collect()
}

fn parse_line(line: &str) -> Result<CatalogEntry, CatalogLineFault> {
    let mut tokens = line.split_whitespace();
    let (Some(name), Some(version)) = (tokens.next(), tokens.next()) else {
        return Err(CatalogLineFault::MissingVersion);
    };

    let extra = tokens.count();
    if extra > 0 {
        debug!(target: "catalog", "ignoring {extra} trailing token(s) after {name} {version}");
    }

    let (major, minor) = version
        .split_once('.')
        .ok_or(CatalogLineFault::VersionNotDotted)?;
    if major.is_empty() || minor.is_empty() || minor.contains('.') {
        return Err(CatalogLineFault::VersionNotDotted);
    }

    if [name, major, minor].iter().any(|token| token.contains(['"', '\\'])) {
        return Err(CatalogLineFault::UnsafeCharacter);
    }

    Ok(CatalogEntry::new(name, major, minor))
}
