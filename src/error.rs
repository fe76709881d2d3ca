//! API error taxonomy and HTTP status mapping.
//!
//! Every failure that can cross a handler boundary is expressed as an
//! [`ApiError`]. Upstream, store, and authentication failures are wrapped
//! into this taxonomy at the component boundary so handlers never leak
//! provider-specific errors. Error responses always carry the structured
//! body `{message, details: [{code, field}]}` and are never cacheable.
//!
//! Secrets and signatures must never appear in any variant's message.

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// A single structured detail attached to an error response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Stable machine-readable code, e.g. `ORG_REQUIRED`.
    pub code: String,
    /// The request field the detail refers to.
    pub field: String,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            field: field.into(),
        }
    }
}

/// Wire shape of every error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub details: Vec<ErrorDetail>,
}

/// Service-wide error taxonomy.
///
/// Variant messages are intentionally generic: authentication failures never
/// reveal which secret, nonce, or signature byte mismatched.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request is structurally invalid (missing/ill-formed fields, bad query
    /// filters, unknown provider, ...).
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<ErrorDetail>,
    },

    /// Unknown repo secret or any generic authentication refusal.
    #[error("Unauthorized")]
    Unauthorized,

    /// One or more of the required signature headers is missing or blank.
    #[error("Required authentication headers are missing")]
    MissingHeaders,

    /// `X-Timestamp` failed to parse as UTC or is outside the skew window.
    #[error("Request timestamp is invalid or outside the accepted window")]
    InvalidTimestamp,

    /// `X-Nonce` was already accepted within the replay window.
    #[error("Nonce has already been used")]
    NonceUsed,

    /// The request signature does not match the request body.
    #[error("Request signature is invalid")]
    InvalidSignature,

    /// Route or resource does not exist.
    #[error("Not found")]
    NotFound,

    /// A test result with this run id was already ingested.
    #[error("Duplicate run id")]
    DuplicateRun,

    /// Upstream dependency or backing store is unavailable.
    #[error("Service temporarily unavailable")]
    Unavailable,

    /// Anything unexpected; details stay in the logs.
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Shorthand for a single-detail validation error.
    pub fn validation(
        message: impl Into<String>,
        code: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            details: vec![ErrorDetail::new(code, field)],
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. }
            | Self::MissingHeaders
            | Self::InvalidTimestamp
            | Self::NonceUsed
            | Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateRun => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the error class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::MissingHeaders => "MISSING_HEADERS",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::NonceUsed => "NONCE_USED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::NotFound => "NOT_FOUND",
            Self::DuplicateRun => "DUPLICATE_RUN",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Builds the structured response body for this error.
    ///
    /// The 401 body carries no detail at all; every other class echoes its
    /// code so clients can branch without string matching.
    pub fn body(&self) -> ErrorBody {
        match self {
            Self::Validation { message, details } => ErrorBody {
                message: message.clone(),
                details: details.clone(),
            },
            Self::Unauthorized => ErrorBody {
                message: self.to_string(),
                details: Vec::new(),
            },
            Self::MissingHeaders | Self::InvalidTimestamp | Self::NonceUsed => ErrorBody {
                message: self.to_string(),
                details: vec![ErrorDetail::new(self.code(), "headers")],
            },
            Self::InvalidSignature => ErrorBody {
                message: self.to_string(),
                details: vec![ErrorDetail::new(self.code(), "x-signature")],
            },
            _ => ErrorBody {
                message: self.to_string(),
                details: vec![ErrorDetail::new(self.code(), "")],
            },
        }
    }
}
