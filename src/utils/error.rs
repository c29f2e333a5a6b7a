use thiserror::Error;

/// Main error type for the Quarry engine
#[derive(Debug, Error)]
pub enum QuarryError {
    #[error("Algebra error: {0}")]
    Algebra(#[from] AlgebraError),

    #[error("Dialect error: {0}")]
    Dialect(#[from] DialectError),

    #[error("External source error: {0}")]
    External(#[from] ExternalError),

    #[error("Requester error: {0}")]
    Requester(#[from] RequesterError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Expression construction and evaluation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlgebraError {
    #[error("type mismatch: operator '{operator}' does not accept {position} operand of type {actual}")]
    TypeMismatch {
        operator: String,
        position: &'static str,
        actual: String,
    },

    #[error("operator '{operator}' expects {expected} operand(s), got {actual}")]
    WrongArity {
        operator: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid extract pattern: {0}")]
    InvalidPattern(String),
}

/// Errors raised when a dialect cannot express a requested operation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DialectError {
    #[error("unsupported cast from {input} to {output} in {dialect} dialect")]
    UnsupportedCast {
        dialect: &'static str,
        input: String,
        output: String,
    },

    #[error("unsupported granularity '{granularity}' in {dialect} dialect")]
    UnsupportedGranularity {
        dialect: &'static str,
        granularity: String,
    },

    #[error("unsupported time part '{part}' in {dialect} dialect")]
    UnsupportedPart {
        dialect: &'static str,
        part: String,
    },

    #[error("{dialect} dialect does not implement {operation}")]
    Unimplemented {
        dialect: &'static str,
        operation: &'static str,
    },
}

/// Errors from schema introspection and metadata queries
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExternalError {
    #[error("introspection failed: {0}")]
    IntrospectionFailed(String),

    #[error("invalid sources response: {0}")]
    InvalidSourceList(String),

    #[error("invalid version response: {0}")]
    InvalidVersionResponse(String),

    #[error("unknown engine: {0}")]
    UnknownEngine(String),
}

/// Transport-level errors surfaced on a request's output channel
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequesterError {
    #[error("invalid requester configuration: {0}")]
    InvalidConfig(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    Timeout { elapsed_ms: u64, budget_ms: u64 },
}

/// Result type alias for Quarry operations
pub type QuarryResult<T> = Result<T, QuarryError>;
