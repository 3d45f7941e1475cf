use std::io;
use std::path::PathBuf;

/// Message key of a grammar violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatErrorKind {
    #[error("continuation line with nothing to continue")]
    LineNowhere,

    #[error("unsupported LDIF version '{0}'")]
    UnsupportedVersion(String),

    #[error("expecting '{0}'")]
    ExpectingPrefix(&'static str),

    #[error("expecting ':' separator")]
    ExpectingSeparator,

    #[error("unsupported change type '{0}'")]
    UnsupportedChangeType(String),

    #[error("unknown modify operation '{0}'")]
    UnknownOperation(String),

    #[error("expecting values for attribute '{0}'")]
    ExpectingAttribute(String),

    #[error("attribute '{found}' does not match modification of '{expected}'")]
    AttributeMismatch { expected: String, found: String },

    #[error("deleteoldrdn must be 0 or 1, got '{0}'")]
    DeleteOldRdn(String),

    #[error("expecting control OID")]
    ExpectingOid,

    #[error("control criticality must be 'true' or 'false', got '{0}'")]
    ExpectingCriticality(String),

    #[error("malformed URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid base64 value")]
    InvalidBase64,

    #[error("control {oid}: {message}")]
    InvalidControl { oid: String, message: String },

    #[error("unexpected line '{0}'")]
    Unexpected(String),

    #[error("malformed markup: {0}")]
    Markup(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LdifError {
    #[error("line {line}: {kind}")]
    Format { line: u64, kind: FormatErrorKind },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{}: {source}", path.display())]
    File { path: PathBuf, source: io::Error },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("configuration: {0}")]
    Config(String),
}

impl LdifError {
    pub fn format(line: u64, kind: FormatErrorKind) -> Self {
        LdifError::Format { line, kind }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        LdifError::UnsupportedOperation(msg.into())
    }

    /// Line number for format errors.
    pub fn line(&self) -> Option<u64> {
        match self {
            LdifError::Format { line, .. } => Some(*line),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<&FormatErrorKind> {
        match self {
            LdifError::Format { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, LdifError::Io(_) | LdifError::File { .. })
    }
}

pub type Result<T> = std::result::Result<T, LdifError>;
