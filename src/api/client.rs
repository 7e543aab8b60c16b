//! Typed calls against the monitoring backend

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::auth::{AuthGuard, SessionEvent};
use super::credentials::Credentials;
use super::transport::{ApiRequest, HttpTransport};
use super::{endpoint, LoginRequest, LoginResponse, LOGIN_PATH, UPLOAD_PATH};
use crate::config::BackendConfig;
use crate::error::{Result, SyncError};
use crate::telemetry::reading::UploadRecord;
use crate::telemetry::Reading;

/// Backend client: login plus authenticated telemetry upload
#[derive(Debug)]
pub struct BackendClient<T> {
    guard: AuthGuard<T>,
    login_url: String,
    upload_url: String,
}

impl<T: HttpTransport> BackendClient<T> {
    pub fn new(transport: T, credentials: Credentials, config: &BackendConfig) -> Self {
        Self {
            guard: AuthGuard::new(transport, credentials, config.auth_base_url.clone()),
            login_url: endpoint(&config.auth_base_url, LOGIN_PATH),
            upload_url: endpoint(&config.upload_base_url, UPLOAD_PATH),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        self.guard.credentials()
    }

    pub fn is_logged_in(&self) -> bool {
        self.guard.credentials().is_logged_in()
    }

    /// Receive forced-logout notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.guard.subscribe()
    }

    /// Authenticate and store the returned tokens
    ///
    /// Sent without the auth guard: a rejected password must not trigger a
    /// refresh or a forced logout.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Transport`] when the backend is unreachable
    /// - [`SyncError::Api`] when the credentials are rejected
    /// - [`SyncError::Json`] when the response has no `jwt`
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let request = ApiRequest::post_json(&self.login_url, &LoginRequest { email, password })?;
        let response = self
            .guard
            .transport()
            .execute(request)
            .await?
            .error_for_status()
            .map_err(|e| {
                warn!("Login rejected: {}", e);
                e
            })?;

        let LoginResponse { jwt, refresh_token } = response.json()?;
        if refresh_token.is_none() {
            info!("Login response carried no refresh token");
        }
        self.credentials().save_login(&jwt, refresh_token.as_deref())?;
        info!("Logged in as {}", email);
        Ok(())
    }

    /// Drop stored credentials
    pub fn logout(&self) -> Result<()> {
        self.credentials().clear()?;
        info!("Logged out");
        Ok(())
    }

    /// POST `readings` to the bulk upload endpoint
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotAuthenticated`] when no token is stored
    /// - [`SyncError::Transport`] on network failure
    /// - [`SyncError::Api`] on any non-2xx answer
    pub async fn upload(&self, readings: &[Reading]) -> Result<()> {
        if !self.is_logged_in() {
            return Err(SyncError::NotAuthenticated);
        }

        let records: Vec<UploadRecord> = readings.iter().map(Reading::to_upload_record).collect();
        let request = ApiRequest::post_json(&self.upload_url, &records)?;
        debug!("Uploading {} readings to {}", records.len(), self.upload_url);

        self.guard.send(request).await?.error_for_status()?;
        Ok(())
    }
}
