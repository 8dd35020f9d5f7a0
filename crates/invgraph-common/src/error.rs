use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a backend call could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailableCause {
    Timeout,
    Connection,
    /// The backend answered with a transient HTTP status.
    Status(u16),
}

impl fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableCause::Timeout => write!(f, "timeout"),
            UnavailableCause::Connection => write!(f, "connection failure"),
            UnavailableCause::Status(code) => write!(f, "status {}", code),
        }
    }
}

/// Coarse classification used by the service boundary to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller's query name, parameters or style are invalid.
    InvalidRequest,
    /// The query service is temporarily unavailable; retrying may succeed.
    Unavailable,
    /// Schema, template or compiler/backend inconsistency.
    Internal,
}

/// Errors produced by rule resolution, compilation and execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("no edge rule from '{from}' to '{to}'{}", label_suffix(.label))]
    NoEdgeRuleFound {
        from: String,
        to: String,
        label: Option<String>,
    },
    #[error("ambiguous edge rules from '{from}' to '{to}': candidates [{}]", .candidates.join(", "))]
    AmbiguousEdgeRule {
        from: String,
        to: String,
        candidates: Vec<String>,
    },
    #[error("invalid edge rule schema: {0}")]
    InvalidSchema(String),
    #[error("invalid query template '{query}': {reason}")]
    InvalidTemplate { query: String, reason: String },
    #[error("query '{name}' not found")]
    QueryNotFound { name: String },
    #[error("query '{query}' requires parameter '{parameter}'")]
    MissingRequiredParameter { query: String, parameter: String },
    #[error("query '{query}' cannot produce this result style: {reason}")]
    UnsupportedResultStyle { query: String, reason: String },
    #[error("graph backend unavailable ({cause}): {detail}")]
    BackendUnavailable {
        cause: UnavailableCause,
        detail: String,
    },
    #[error("compiled query rejected by backend: {0}")]
    CompiledQueryRejected(String),
}

fn label_suffix(label: &Option<String>) -> String {
    match label {
        Some(l) => format!(" with label '{}'", l),
        None => String::new(),
    }
}

impl QueryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueryError::QueryNotFound { .. }
            | QueryError::MissingRequiredParameter { .. }
            | QueryError::UnsupportedResultStyle { .. } => ErrorCategory::InvalidRequest,
            QueryError::BackendUnavailable { .. } => ErrorCategory::Unavailable,
            QueryError::NoEdgeRuleFound { .. }
            | QueryError::AmbiguousEdgeRule { .. }
            | QueryError::InvalidSchema(_)
            | QueryError::InvalidTemplate { .. }
            | QueryError::CompiledQueryRejected(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::BackendUnavailable { .. })
    }

    pub fn unavailable(cause: UnavailableCause, detail: impl Into<String>) -> Self {
        QueryError::BackendUnavailable { cause, detail: detail.into() }
    }

    pub fn invalid_template(query: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::InvalidTemplate { query: query.into(), reason: reason.into() }
    }
}
