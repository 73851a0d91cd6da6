//! Runtime error taxonomy shared by every reader and writer.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Result alias returned by every contract method.
pub type DslResult<T> = Result<T, DslError>;

/// Classification of an expected runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DslErrorKind {
    InvalidSymbol,
    UnsupportedOperation,
    RateLimited,
    NetworkError,
    InvalidResponse,
    NotFound,
    /// The actor is not in the `Ready` state.
    NotReady,
    /// A sink refused a single item of a write.
    Rejected,
}

impl DslErrorKind {
    pub const ALL: [Self; 8] = [
        Self::InvalidSymbol,
        Self::UnsupportedOperation,
        Self::RateLimited,
        Self::NetworkError,
        Self::InvalidResponse,
        Self::NotFound,
        Self::NotReady,
        Self::Rejected,
    ];

    pub const fn retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::NetworkError)
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidSymbol => "dsl.invalid_symbol",
            Self::UnsupportedOperation => "dsl.unsupported_operation",
            Self::RateLimited => "dsl.rate_limited",
            Self::NetworkError => "dsl.network_error",
            Self::InvalidResponse => "dsl.invalid_response",
            Self::NotFound => "dsl.not_found",
            Self::NotReady => "dsl.not_ready",
            Self::Rejected => "dsl.rejected",
        }
    }
}

impl Display for DslErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Structured error carried by a failed [`DslResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DslError {
    kind: DslErrorKind,
    message: String,
    retryable: bool,
}

impl DslError {
    pub fn new(kind: DslErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.retryable(),
        }
    }

    pub fn invalid_symbol(message: impl Into<String>) -> Self {
        Self::new(DslErrorKind::InvalidSymbol, message)
    }

    pub fn unsupported(operation: impl Display, actor: &str) -> Self {
        Self::new(
            DslErrorKind::UnsupportedOperation,
            format!("operation '{operation}' is not supported by '{actor}'"),
        )
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(DslErrorKind::RateLimited, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(DslErrorKind::NetworkError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(DslErrorKind::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(DslErrorKind::NotFound, message)
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(DslErrorKind::NotReady, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(DslErrorKind::Rejected, message)
    }

    pub const fn kind(&self) -> DslErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Prefixes the message with the actor name, keeping kind and retryability.
    pub fn in_actor(self, actor: &str) -> Self {
        Self {
            message: format!("{actor}: {}", self.message),
            ..self
        }
    }
}

impl Display for DslError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for DslError {}

/// Payload values that fail their factory are a provider data-quality problem.
impl From<ValidationError> for DslError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_response(error.to_string())
    }
}
