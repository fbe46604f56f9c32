use super::model::ActStatus;
use super::types::Id;

/// Failures raised by a ledger gateway.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("act number {0} is already taken")]
    ActNumberTaken(String),
    #[error("trip {0} is already claimed by another act")]
    TripAlreadyClaimed(Id),
    #[error("act {0} does not exist")]
    MissingAct(Id),
    #[error("act {id} is no longer {expected}")]
    StatusConflict { id: Id, expected: ActStatus },
    #[error("request was cancelled or its deadline passed")]
    Cancelled,
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("record codec failure: {0}")]
    Codec(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ActError {
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no trips for selected period")]
    NoBillableTrips,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("document rendering failed: {0}")]
    Render(#[source] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Outward classification of an [`ActError`]. The boundary layer maps these to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    InvalidInput,
    NoBillableTrips,
    Internal,
}

impl ActError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ActError::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ActError::NotFound => ErrorKind::NotFound,
            ActError::PermissionDenied => ErrorKind::PermissionDenied,
            ActError::InvalidInput(_) => ErrorKind::InvalidInput,
            ActError::NoBillableTrips => ErrorKind::NoBillableTrips,
            ActError::Ledger(_) | ActError::Render(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show a caller. Internal failures are collapsed to a generic text.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}
