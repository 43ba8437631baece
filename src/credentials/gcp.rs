//! GCP credential provider using ambient credentials
//!
//! Tokens are resolved fresh on every call. The client reconnects exactly
//! when the store starts rejecting the current token, so a cached token would
//! defeat the reconnect.

use crate::config::schema::GcsConfig;
use crate::error::{CacheError, CacheResult};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// GCP credential provider
pub struct GcpCredentials;

impl GcpCredentials {
    /// Environment variable holding a pre-minted OAuth access token
    pub const TOKEN_ENV: &'static str = "GOOGLE_OAUTH_ACCESS_TOKEN";

    /// Get an access token from the environment, falling back to gcloud
    pub async fn access_token(config: &GcsConfig) -> CacheResult<String> {
        if let Some(token) = Self::token_from_env() {
            debug!("Using GCP access token from {}", Self::TOKEN_ENV);
            return Ok(token);
        }

        Self::token_from_gcloud(config).await
    }

    fn token_from_env() -> Option<String> {
        std::env::var(Self::TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Get access token from gcloud CLI
    async fn token_from_gcloud(config: &GcsConfig) -> CacheResult<String> {
        debug!("Requesting GCP access token from gcloud");

        let mut cmd = Command::new("gcloud");
        cmd.args(["auth", "print-access-token"]);

        if let Some(account) = &config.service_account {
            cmd.args(["--impersonate-service-account", account]);
        }

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .map_err(|e| CacheError::command_failed("gcloud auth print-access-token", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not logged in") || stderr.contains("no active account") {
                return Err(CacheError::GcpNotAuthenticated);
            }
            return Err(CacheError::GcpCredential(stderr.trim().to_string()));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if token.is_empty() {
            return Err(CacheError::GcpCredential("Empty token returned".to_string()));
        }

        Ok(token)
    }
}
