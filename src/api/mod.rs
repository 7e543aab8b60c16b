//! # Backend API Module
//!
//! HTTP access to the monitoring backend.
//!
//! This module handles:
//! - Sending requests through a swappable transport
//! - Attaching the access token and refreshing it once on 401
//! - Login, token refresh and bulk telemetry upload wire formats
//! - Persisting credentials and announcing forced logout

pub mod auth;
pub mod client;
pub mod credentials;
pub mod transport;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

pub use auth::{AuthGuard, SessionEvent};
pub use client::BackendClient;
pub use credentials::Credentials;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

/// Header carrying the access token
pub const AUTH_HEADER: &str = "x-auth-token";

/// Login endpoint, relative to the auth base URL
pub const LOGIN_PATH: &str = "/v2/authenticate";

/// Refresh endpoint prefix; the refresh token is appended as a path segment
pub const REFRESH_PATH: &str = "/v2/authenticate/refreshtoken";

/// Bulk upload endpoint, relative to the upload base URL
pub const UPLOAD_PATH: &str = "/cognitive-monitoring/v2/devicedata/saveAll";

/// Join a base URL and an absolute path without doubling the slash
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// [`endpoint`] followed by `segment` as a single percent-encoded path segment
pub fn endpoint_with_segment(base_url: &str, path: &str, segment: &str) -> Result<String> {
    let joined = endpoint(base_url, path);
    let mut url = reqwest::Url::parse(&joined)
        .map_err(|e| SyncError::Transport(format!("Invalid URL {}: {}", joined, e)))?;
    url.path_segments_mut()
        .map_err(|_| SyncError::Transport(format!("URL {} cannot take a path", joined)))?
        .push(segment);
    Ok(url.into())
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub jwt: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub jwt: String,
}
