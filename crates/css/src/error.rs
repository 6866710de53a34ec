//! CSS parsing error types
//!
//! These never escape [`CssDocument::parse`](crate::CssDocument::parse): a
//! region that fails to parse is kept as an opaque span instead. They are
//! used by the selector parser and surface in debug logging.

use std::fmt;
use thiserror::Error;

/// CSS parsing result type
pub type CssResult<T> = Result<T, CssError>;

/// Source location in CSS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start
    pub offset: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// CSS parsing errors
#[derive(Debug, Error)]
pub enum CssError {
    #[error("Invalid selector '{selector}' at {location}")]
    InvalidSelector {
        selector: String,
        location: SourceLocation,
    },
}

impl CssError {
    pub fn invalid_selector(selector: impl Into<String>, location: SourceLocation) -> Self {
        Self::InvalidSelector { selector: selector.into(), location }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation::new(10, 5, 100);
        assert_eq!(format!("{}", loc), "10:5");
    }

    #[test]
    fn test_invalid_selector_display() {
        let err = CssError::invalid_selector("!huh!", SourceLocation::new(1, 1, 0));
        assert_eq!(format!("{}", err), "Invalid selector '!huh!' at 1:1");
        assert!(matches!(err, CssError::InvalidSelector { location, .. } if location.offset == 0));
    }
}
