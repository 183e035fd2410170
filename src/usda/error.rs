//! Diagnostics produced while parsing text layers.

use std::fmt;

use strum::{Display, EnumIs};
use thiserror::Error;

use crate::sdf::{ListOpError, PathError};

/// Category of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIs)]
pub enum ErrorKind {
    InvalidIdentifier,
    DuplicateSpec,
    /// Attribute redeclared with a different type or variability, or a value
    /// that does not fit the declared type.
    TypeMismatch,
    ArityMismatch,
    NonSquareShape,
    /// Scalar at `index` (in the flattened value) could not be converted.
    ValueConversionError { index: usize },
    InvalidListEdit,
    InvalidPathReference,
    MalformedHeader,
    UnexpectedToken,
    UnexpectedEof,
    InvalidValue,
    /// The parser itself is in an inconsistent state.
    Internal,
}

/// Where in the input an error was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// 1-based.
    pub line: usize,
    /// 1-based, in characters.
    pub column: usize,
    pub snippet: String,
    /// Scene path being parsed when the error occurred.
    pub path: String,
    pub file: String,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " at '{}' in <{}> on line {}, column {} in file {}",
            self.snippet, self.path, self.line, self.column, self.file
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}{}", .location.as_ref().map(ToString::to_string).unwrap_or_default())]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

impl ParseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Attaches a location unless one is already present.
    pub fn at(mut self, location: impl FnOnce() -> Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location());
        }
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.location.as_ref().map(|loc| loc.line)
    }
}

impl From<PathError> for ParseError {
    fn from(err: PathError) -> Self {
        let kind = match err {
            PathError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            PathError::InvalidPath { .. } => ErrorKind::InvalidPathReference,
        };
        ParseError::new(kind, err.to_string())
    }
}

impl From<ListOpError> for ParseError {
    fn from(err: ListOpError) -> Self {
        ParseError::new(ErrorKind::InvalidListEdit, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Returns `ErrorKind::Internal` from the enclosing function. Debug builds
/// panic instead, a coding error is never a property of the input.
macro_rules! coding_error {
    ($($arg:tt)*) => {{
        debug_assert!(false, $($arg)*);
        return Err($crate::usda::error::ParseError::new(
            $crate::usda::error::ErrorKind::Internal,
            format!($($arg)*),
        ));
    }};
}

pub(crate) use coding_error;

/// `return Err(ParseError::new(kind, format!(...)))`
macro_rules! fail {
    ($kind:expr, $($arg:tt)*) => {
        return Err($crate::usda::error::ParseError::new($kind, format!($($arg)*)))
    };
}

pub(crate) use fail;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_location() {
        let err = ParseError::new(ErrorKind::DuplicateSpec, "Duplicate prim 'A'").at(|| Location {
            line: 3,
            column: 5,
            snippet: "\"A\"".into(),
            path: "/A".into(),
            file: "scene.usda".into(),
        });

        assert_eq!(
            err.to_string(),
            "Duplicate prim 'A' at '\"A\"' in </A> on line 3, column 5 in file scene.usda"
        );
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn display_without_location() {
        let err = ParseError::new(ErrorKind::ValueConversionError { index: 1 }, "bad");
        assert_eq!(err.to_string(), "bad");
        assert!(err.kind.is_value_conversion_error());
        assert_eq!(err.kind.to_string(), "ValueConversionError");
    }

    #[test]
    fn first_location_wins() {
        let loc = |line| Location {
            line,
            column: 1,
            snippet: String::new(),
            path: "/".into(),
            file: "<string>".into(),
        };

        let err = ParseError::new(ErrorKind::Internal, "x").at(|| loc(1)).at(|| loc(2));
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn convert_path_error() {
        let err: ParseError = PathError::InvalidIdentifier("1abc".into()).into();
        assert_eq!(err.kind, ErrorKind::InvalidIdentifier);
    }
}
