use thiserror::Error;

#[derive(Debug, Error)]
pub enum DsyncError {
    #[error("no lockers configured")]
    NoLockers,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("locker {endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },
    #[error("locker call to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DsyncError {
    /// True when the error means the remote node could not be reached, as
    /// opposed to the node answering with a refusal.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Timeout { .. } | Self::Io(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoLockers => "NoLockers",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Unreachable { .. } => "Unreachable",
            Self::Timeout { .. } => "Timeout",
            Self::InvalidConfig { .. } => "InvalidConfig",
            Self::InternalError(_) => "InternalError",
            Self::Io(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, DsyncError>;
