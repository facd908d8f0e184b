//! Error types for the spec module.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for spec operations.
pub type SpecResult<T> = Result<T, SpecError>;

/// Line/column in a specification file, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Malformed specification text.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}: {message}", location(.file, .position))]
pub struct ParseError {
    pub file: PathBuf,
    pub position: Option<Position>,
    pub message: String,
}

impl ParseError {
    pub fn new(file: impl Into<PathBuf>, position: Option<Position>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            position,
            message: message.into(),
        }
    }
}

fn location(file: &PathBuf, position: &Option<Position>) -> String {
    match position {
        Some(position) => format!("{}:{}", file.display(), position),
        None => file.display().to_string(),
    }
}

/// Errors that can occur during spec operations.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Parse error in {0}")]
    Parse(#[from] ParseError),

    #[error("Specification invariant violated: {0}")]
    Invariant(String),

    #[error("No specification files found in {0}")]
    NoSpecFiles(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
