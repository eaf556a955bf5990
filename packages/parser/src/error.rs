use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed XML at byte {pos}: {message}")]
    MalformedXml { pos: u64, message: String },

    #[error("Unknown element <{element}> at {path}")]
    UnknownElement { element: String, path: String },

    #[error("Element <{child}> is not allowed inside <{parent}> at {path}")]
    InvalidChild {
        parent: String,
        child: String,
        path: String,
    },

    #[error("Invalid attributes at {path}: {}", join_errors(.errors))]
    InvalidAttributes {
        path: String,
        errors: Vec<ValidationError>,
    },

    #[error("Invalid JSON at {path}: {message}")]
    InvalidJson { path: String, message: String },

    #[error("Invalid syntax at {path}: {message}")]
    InvalidSyntax { path: String, message: String },
}

impl ParseError {
    pub fn malformed(pos: u64, message: impl Into<String>) -> Self {
        Self::MalformedXml {
            pos,
            message: message.into(),
        }
    }

    pub fn invalid_syntax(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Element path of the fault, when the XML itself was well-formed
    pub fn path(&self) -> Option<&str> {
        match self {
            ParseError::MalformedXml { .. } => None,
            ParseError::UnknownElement { path, .. }
            | ParseError::InvalidChild { path, .. }
            | ParseError::InvalidAttributes { path, .. }
            | ParseError::InvalidJson { path, .. }
            | ParseError::InvalidSyntax { path, .. } => Some(path),
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorType {
    UnknownElement,
    MissingAttribute,
    InvalidAttributeValue,
    PatternMismatch,
    CustomValidation,
    EmptyId,
    DuplicateId,
    InvalidFunctionName,
}

/// One attribute, content or structure violation. Validators return these
/// as lists so every problem is reported at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub error_type: ValidationErrorType,
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(error_type: ValidationErrorType, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Design-time problem in a grammar rule set. Compilation records these
/// instead of failing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Unresolved rule reference '{0}'")]
    UnresolvedReference(String),

    #[error("Duplicate rule name '{0}'")]
    DuplicateRule(String),

    #[error("Invalid pattern for <{element}> attribute '{attribute}': {message}")]
    InvalidPattern {
        element: String,
        attribute: String,
        message: String,
    },
}
