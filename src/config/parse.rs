//! Parsing of watched configuration files.
//!
//! Two formats are supported:
//! - single-value files, whose entire content is the value and whose base
//!   name is the key (a mounted bearer token, for instance)
//! - properties files of newline-terminated `key=value` pairs

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Error type for configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file was registered with a parse mode nobody knows how to read.
    #[error("bad parse mode {0:?}, expected \"single-value\" or \"properties\"")]
    InvalidParseMode(String),

    /// The OS file watch could not be created or attached.
    #[error("couldn't watch config file {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The file exists but could not be read.
    #[error("error parsing config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    /// Whether this error means the file simply isn't there (yet).
    pub fn is_not_found(&self) -> bool {
        match self {
            ConfigError::Read { source, .. } => source.kind() == io::ErrorKind::NotFound,
            ConfigError::Watch { source, .. } => is_missing_path(source),
            ConfigError::InvalidParseMode(_) => false,
        }
    }
}

/// Whether a notify error was caused by the watched path not existing.
pub(crate) fn is_missing_path(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::PathNotFound => true,
        notify::ErrorKind::Io(e) => e.kind() == io::ErrorKind::NotFound,
        _ => false,
    }
}

/// How a watched file is turned into key/value entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseMode {
    /// Whole content is one value, keyed by the file's base name.
    SingleValue,
    /// `key=value` lines, `#` comments.
    Properties,
}

impl FromStr for ParseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single-value" => Ok(ParseMode::SingleValue),
            "properties" => Ok(ParseMode::Properties),
            other => Err(ConfigError::InvalidParseMode(other.to_string())),
        }
    }
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMode::SingleValue => write!(f, "single-value"),
            ParseMode::Properties => write!(f, "properties"),
        }
    }
}

/// Read `path` and produce every entry it defines.
///
/// The file is read fully and closed before returning, so callers can
/// apply the result under a lock without holding it across I/O.
pub fn parse_file(path: &Path, mode: ParseMode) -> Result<HashMap<String, String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(match mode {
        ParseMode::SingleValue => {
            let mut entries = HashMap::with_capacity(1);
            entries.insert(single_value_key(path), content);
            entries
        }
        ParseMode::Properties => parse_properties(&content),
    })
}

/// Key under which a single-value file is stored: its base name.
pub fn single_value_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse `key=value` lines.
///
/// Lines are trimmed, then split on the first `=`. Lines without `=` and
/// lines whose key starts with `#` are skipped. Later lines win.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .filter(|(key, _)| !key.starts_with('#'))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
