use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::command::{Command, CommandArgs};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDevice {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub mfa_token: Option<String>,
    #[serde(default)]
    pub one_time_code: Option<OneTimeCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub method: OtpMethod,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpMethod {
    App,
    Sms,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    OtpRequired { methods: Vec<OtpMethod> },
    MustEnableMfa,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Changed { device_id: Option<String> },
    Disconnected,
    // Closed on purpose; do not resubscribe.
    Stopped,
}

pub type EventStream = mpsc::Receiver<PushEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    Transient,
    Protocol,
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("unexpected payload: {0}")]
    Protocol(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("timeout")]
    Timeout,
    #[error("not supported by this client: {0}")]
    Unsupported(String),
}

impl ClientError {
    // Permission and unsupported only happen on the command path; a fetch
    // reporting one counts as a bad payload.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Auth(_) => FailureKind::Auth,
            Self::Transient(_) | Self::Timeout => FailureKind::Transient,
            Self::Protocol(_) | Self::Permission(_) | Self::Unsupported(_) => FailureKind::Protocol,
        }
    }
}

#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResult, ClientError>;

    async fn submit_otp(&self, method: OtpMethod, code: &str) -> Result<String, ClientError>;

    async fn fetch_state(&self) -> Result<Vec<RawDevice>, ClientError>;

    async fn send_command(
        &self,
        device_id: &str,
        command: Command,
        args: &CommandArgs,
    ) -> Result<(), ClientError>;

    /// `Ok(None)`: no push channel, poll only. Dropping the stream unsubscribes.
    async fn subscribe(&self) -> Result<Option<EventStream>, ClientError> {
        Ok(None)
    }

    async fn keep_alive(&self) -> Result<(), ClientError> {
        Ok(())
    }
}
