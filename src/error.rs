//! Error taxonomy and diagnostic collection.
//!
//! Fatal conditions are [`CanonError`] values. Degraded-but-successful
//! outcomes are recorded as [`Diagnostic`]s in a per-call [`Diagnostics`]
//! collector and returned alongside the result.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::TypeId;

#[derive(Debug, Error)]
pub enum CanonError {
    /// Malformed or unreadable input document.
    #[error("failed to parse {format} document: {message}")]
    Parse { format: String, message: String },

    /// A schema violates a structural invariant (array without items,
    /// union without variants, dangling `$ref`, alias cycle).
    #[error("structural error at {path}: {message}")]
    Structural { path: String, message: String },

    /// Registry lookup for an ID that was never issued. Indicates a builder
    /// defect, never a user input error.
    #[error("unresolved type reference {0}")]
    UnresolvedReference(TypeId),

    /// Post-build invariant failures.
    #[error("schema failed validation with {} error(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    #[error("failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A per-language generator could not produce its output.
    #[error("{language} generation failed: {message}")]
    Generation { language: String, message: String },
}

impl CanonError {
    pub fn parse(format: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse { format: format.into(), message: message.to_string() }
    }

    pub fn structural(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structural { path: path.into(), message: message.into() }
    }

    /// Stable machine-readable code, mirrored into [`Diagnostic::code`].
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::Structural { .. } => "structural_error",
            Self::UnresolvedReference(_) => "unresolved_reference",
            Self::Validation(_) => "validation_error",
            Self::Io { .. } => "io_error",
            Self::Generation { .. } => "generation_error",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let path = match self {
            Self::Structural { path, .. } => path.clone(),
            Self::Io { path, .. } => path.display().to_string(),
            _ => String::from("#"),
        };
        Diagnostic { path, code: self.code().to_string(), message: self.to_string() }
    }
}

pub type Result<T, E = CanonError> = std::result::Result<T, E>;

/// One post-build invariant failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub code: String,
    pub message: String,
}

/// A warning or a reported (non-thrown) error.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: String,
    pub code: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.path, self.message)
    }
}

/// Per-call collector. Never shared between calls.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Diagnostic>,
    errors: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, path: impl Into<String>, code: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            path: path.into(),
            code: code.to_string(),
            message: message.into(),
        };
        tracing::warn!(path = %diagnostic.path, code, "{}", diagnostic.message);
        self.warnings.push(diagnostic);
    }

    pub fn error(&mut self, error: &CanonError) {
        self.errors.push(error.to_diagnostic());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn into_parts(self) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
        (self.errors, self.warnings)
    }
}

/// Warning codes emitted by adapters and the builder.
pub mod codes {
    pub const UNKNOWN_PRIMITIVE: &str = "unknown_primitive";
    pub const UNSUPPORTED_AUTH: &str = "unsupported_auth_scheme";
    pub const UNKNOWN_OAUTH_FLOW: &str = "unknown_oauth_flow";
    pub const UNKNOWN_SECURITY_REFERENCE: &str = "unknown_security_reference";
    pub const MISSING_BODY_SCHEMA: &str = "missing_request_body_schema";
    pub const DUPLICATE_OPERATION_ID: &str = "duplicate_operation_id";
    pub const STATUS_RANGE: &str = "status_code_range";
    pub const INVALID_STATUS: &str = "invalid_status_code";
    pub const NULL_ONLY_UNION: &str = "null_only_union";
    pub const NON_SCALAR_ENUM_VALUE: &str = "non_scalar_enum_value";
    pub const DEGRADED_UNION: &str = "degraded_union";
    pub const IGNORED_ALL_OF_MEMBER: &str = "ignored_all_of_member";
}
