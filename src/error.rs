//! Custom error types for the parsing of Tor documents

use thiserror;

use crate::meta::Item;

/// Error that occured when parsing a Tor document.
///
/// Every failing parse yields exactly one of these; no partially built
/// document ever escapes alongside it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentParseError {
    #[error("The document does not contain any keyword lines")]
    Empty,
    #[error("Byte 0x{byte:02x} on line {line} is not printable ASCII")]
    NonAscii { line: usize, byte: u8 },
    #[error("Line {line} is empty")]
    EmptyLine { line: usize },
    #[error("Line {line} does not start with a keyword")]
    MalformedLine { line: usize },
    #[error("Annotation on line {line} is not allowed after the first keyword line")]
    MisplacedAnnotation { line: usize },
    #[error("Crypto block '{label}' starting on line {line} is never terminated")]
    UnterminatedObject { line: usize, label: String },
    #[error("Crypto block '{label}' is closed by '{found}' on line {line}")]
    MismatchedObject {
        line: usize,
        label: String,
        found: String,
    },
    #[error("Crypto block on line {line} does not belong to a keyword line")]
    OrphanObject { line: usize },
    #[error("Document must start with '{expected}', but line {line} has '{found}'")]
    WrongFirstKeyword {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("Mandatory keyword '{keyword}' is missing")]
    MissingKeyword { keyword: String },
    #[error("Keyword '{keyword}' on line {line} may only appear once")]
    DuplicateKeyword { line: usize, keyword: String },
    #[error("An item with keyword '{keyword}' was not expected at this position (line {line})")]
    UnexpectedKeyword { line: usize, keyword: String },
    #[error("Keyword '{keyword}' on line {line} must be followed by a crypto block")]
    ObjectMissing { line: usize, keyword: String },
    #[error("Keyword '{keyword}' on line {line} must not be followed by a crypto block")]
    UnexpectedObject { line: usize, keyword: String },
    #[error("Invalid '{keyword}' line {line}: {reason}")]
    InvalidItem {
        line: usize,
        keyword: String,
        reason: String,
    },
    #[error("Unrecognized line {line}: '{content}'")]
    UnrecognizedLine { line: usize, content: String },
    #[error("Invalid document: {reason}")]
    InvalidDocument { reason: String },
}

impl DocumentParseError {
    /// Create a new InvalidItem error for the given item
    pub(crate) fn invalid(item: &Item<'_>, reason: impl ToString) -> DocumentParseError {
        DocumentParseError::InvalidItem {
            line: item.line_no,
            keyword: item.keyword.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a new InvalidItem error complaining about the argument count
    pub(crate) fn args_missing(item: &Item<'_>) -> DocumentParseError {
        Self::invalid(item, "wrong number of arguments")
    }

    pub(crate) fn missing(keyword: impl Into<String>) -> DocumentParseError {
        DocumentParseError::MissingKeyword {
            keyword: keyword.into(),
        }
    }

    pub(crate) fn duplicate(item: &Item<'_>) -> DocumentParseError {
        DocumentParseError::DuplicateKeyword {
            line: item.line_no,
            keyword: item.keyword.to_string(),
        }
    }

    pub(crate) fn unexpected(item: &Item<'_>) -> DocumentParseError {
        DocumentParseError::UnexpectedKeyword {
            line: item.line_no,
            keyword: item.keyword.to_string(),
        }
    }

    pub(crate) fn document(reason: impl ToString) -> DocumentParseError {
        DocumentParseError::InvalidDocument {
            reason: reason.to_string(),
        }
    }
}

/// Failure of a single field validator.
///
/// Carries only the reason; [`ErrorContext`] attaches the offending line.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FieldError(pub(crate) String);

impl FieldError {
    pub(crate) fn new(reason: impl Into<String>) -> FieldError {
        FieldError(reason.into())
    }
}

pub(crate) trait ErrorContext<T> {
    type IntoError;

    fn context(self, item: &Item<'_>) -> Result<T, Self::IntoError>;
}

impl<T> ErrorContext<T> for Result<T, FieldError> {
    type IntoError = DocumentParseError;

    fn context(self, item: &Item<'_>) -> Result<T, Self::IntoError> {
        self.map_err(|e| DocumentParseError::invalid(item, e))
    }
}
