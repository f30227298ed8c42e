use thiserror::Error;

/// Allocation engine errors
#[derive(Error, Debug)]
pub enum AllocationError {
    /// Campaign or agent failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed destination phone number
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Per-agent minute cap exceeded
    #[error("Agent {agent} rate limited, retry in {retry_after_seconds}s")]
    RateLimited {
        agent: String,
        retry_after_seconds: u64,
    },

    /// All candidates reserved, capped, or inactive
    #[error("No caller IDs available")]
    NoneAvailable,

    /// Transient store failure; safe to retry
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Attempt to create an existing caller ID
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl AllocationError {
    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new InvalidDestination error
    pub fn invalid_destination<S: Into<String>>(msg: S) -> Self {
        Self::InvalidDestination(msg.into())
    }

    /// Create a new Unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a new Conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable error kind for transport layers
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidDestination(_) => "invalid_destination",
            Self::RateLimited { .. } => "rate_limited",
            Self::NoneAvailable => "none_available",
            Self::Unavailable(_) => "unavailable",
            Self::Conflict(_) => "conflict",
        }
    }
}

impl From<crate::coordination::CoordinationError> for AllocationError {
    fn from(err: crate::coordination::CoordinationError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Result type for allocation operations
pub type Result<T> = std::result::Result<T, AllocationError>;
