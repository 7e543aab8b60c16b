//! # Auth Guard
//!
//! Wraps every authenticated request.
//!
//! 1. Attach the stored access token, if any, as `x-auth-token`.
//! 2. Send.
//! 3. On 401 with a refresh token stored: call the refresh endpoint once,
//!    store the new token and resend the original request once. A second
//!    401 is handed back unchanged.
//! 4. On 401 without a refresh token, or when the refresh fails: clear the
//!    credentials and broadcast [`SessionEvent::ForcedLogout`].

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::credentials::Credentials;
use super::transport::{ApiRequest, ApiResponse, HttpTransport};
use super::{endpoint_with_segment, RefreshResponse, AUTH_HEADER, REFRESH_PATH};
use crate::error::{Result, SyncError};

/// Session changes the rest of the application reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were cleared; the user has to log in again
    ForcedLogout,
}

const SESSION_EVENT_CAPACITY: usize = 16;

/// Request wrapper that handles token attachment and one-shot refresh
pub struct AuthGuard<T> {
    transport: T,
    credentials: Credentials,
    auth_base_url: String,
    events: broadcast::Sender<SessionEvent>,
}

impl<T> std::fmt::Debug for AuthGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard")
            .field("auth_base_url", &self.auth_base_url)
            .finish_non_exhaustive()
    }
}

impl<T: HttpTransport> AuthGuard<T> {
    pub fn new(transport: T, credentials: Credentials, auth_base_url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            transport,
            credentials,
            auth_base_url: auth_base_url.into(),
            events,
        }
    }

    /// Receive future session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Underlying transport, for calls that must not carry a token
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request` with authentication
    ///
    /// Any HTTP status is returned as `Ok`; only network failures of the
    /// original request or of the retry are errors. A failed refresh never
    /// surfaces as an error: the caller gets the original 401.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        if let Some(token) = self.credentials.token() {
            request.set_header(AUTH_HEADER, token);
        }

        let mut retry = request.clone();
        let response = self.transport.execute(request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        let Some(refresh_token) = self.credentials.refresh_token() else {
            warn!("Request to {} unauthorized and no refresh token stored", retry.url);
            self.force_logout();
            return Ok(response);
        };

        warn!("Token expired, attempting refresh");
        match self.refresh(&refresh_token).await {
            Ok(token) => {
                retry.set_header(AUTH_HEADER, token);
                let retried = self.transport.execute(retry).await?;
                if retried.is_unauthorized() {
                    warn!("Request still unauthorized after token refresh");
                }
                Ok(retried)
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                self.force_logout();
                Ok(response)
            }
        }
    }

    /// Exchange the refresh token for a new access token and store it
    async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let url = endpoint_with_segment(&self.auth_base_url, REFRESH_PATH, refresh_token)?;
        let response = self
            .transport
            .execute(ApiRequest::get(url))
            .await?
            .error_for_status()?;

        let RefreshResponse { jwt } = response.json()?;
        if jwt.is_empty() {
            return Err(SyncError::NotAuthenticated);
        }

        self.credentials.save_token(&jwt)?;
        info!("Access token refreshed");
        Ok(jwt)
    }

    /// Clear credentials and announce the logout
    pub fn force_logout(&self) {
        error!("Forced logout: credentials rejected and could not be refreshed");
        if let Err(e) = self.credentials.clear() {
            warn!("Failed to clear credentials: {}", e);
        }
        if self.events.send(SessionEvent::ForcedLogout).is_err() {
            debug!("No session listeners for forced logout");
        }
    }
}
