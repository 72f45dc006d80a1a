use thiserror::Error;

use crate::client::{ClientError, FailureKind};
use crate::command::Command;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("unexpected payload: {0}")]
    Protocol(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("invalid arm code")]
    InvalidCode,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("{command} is not supported by {device_id}")]
    UnsupportedCommand { device_id: String, command: Command },
    #[error("reauthentication required")]
    ReauthRequired,
    #[error("coordinator stopped")]
    Stopped,
}

impl SyncError {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Auth(_) | Self::ReauthRequired => Some(FailureKind::Auth),
            Self::Transient(_) => Some(FailureKind::Transient),
            Self::Protocol(_) => Some(FailureKind::Protocol),
            _ => None,
        }
    }
}

impl From<ClientError> for SyncError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Auth(msg) => Self::Auth(msg),
            ClientError::Transient(msg) => Self::Transient(msg),
            ClientError::Timeout => Self::Transient("timeout".to_string()),
            ClientError::Protocol(msg) => Self::Protocol(msg),
            ClientError::Permission(msg) => Self::Permission(msg),
            ClientError::Unsupported(msg) => Self::Protocol(msg),
        }
    }
}
