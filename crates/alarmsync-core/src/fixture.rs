use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::client::{AuthResult, ClientError, Credentials, OtpMethod, RawDevice, RemoteClient};
use crate::command::{Command, CommandArgs};

#[derive(Debug, Clone)]
pub struct FixtureClient {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureFile {
    Wrapped { devices: Vec<RawDevice> },
    Bare(Vec<RawDevice>),
}

impl FixtureClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Re-read on every fetch so edits show up as provider changes.
    pub async fn load(path: &Path) -> Result<Vec<RawDevice>, ClientError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::Transient(format!("{}: {e}", path.display())))?;
        parse_devices(&text)
    }
}

pub fn parse_devices(text: &str) -> Result<Vec<RawDevice>, ClientError> {
    let file: FixtureFile = serde_json::from_str(text)
        .map_err(|e| ClientError::Protocol(format!("device file: {e}")))?;
    Ok(match file {
        FixtureFile::Wrapped { devices } | FixtureFile::Bare(devices) => devices,
    })
}

#[async_trait]
impl RemoteClient for FixtureClient {
    async fn login(&self, _credentials: &Credentials) -> Result<AuthResult, ClientError> {
        Ok(AuthResult::Success)
    }

    async fn submit_otp(&self, _method: OtpMethod, _code: &str) -> Result<String, ClientError> {
        Err(ClientError::Unsupported("one-time codes".to_string()))
    }

    async fn fetch_state(&self) -> Result<Vec<RawDevice>, ClientError> {
        Self::load(&self.path).await
    }

    async fn send_command(
        &self,
        device_id: &str,
        command: Command,
        args: &CommandArgs,
    ) -> Result<(), ClientError> {
        info!(device_id, %command, ?args, "fixture accepted command");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_and_bare_device_files() {
        let wrapped = r#"{"devices": [{"id": "part-1", "type": "partitions", "attributes": {"name": "House"}}]}"#;
        let bare = r#"[{"id": "part-1", "type": "partitions"}]"#;

        assert_eq!(parse_devices(wrapped).expect("wrapped")[0].id, "part-1");
        assert_eq!(parse_devices(bare).expect("bare")[0].resource_type, "partitions");
        assert!(matches!(parse_devices("{}"), Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn fetch_rereads_the_device_file() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("alarmsync-fixture-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.expect("create temp dir");
        let path = dir.join("devices.json");
        tokio::fs::write(&path, r#"[{"id": "part-1", "type": "partitions"}]"#)
            .await
            .expect("write devices");
        let client = FixtureClient::new(&path);

        // Act
        let first = client.fetch_state().await.expect("first fetch");
        tokio::fs::write(&path, r#"{"devices": []}"#).await.expect("rewrite devices");
        let second = client.fetch_state().await.expect("second fetch");
        let missing = FixtureClient::load(&dir.join("absent.json")).await;

        // Assert
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(matches!(missing, Err(ClientError::Transient(_))));

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
