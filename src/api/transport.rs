//! Trait abstraction for HTTP exchanges to enable testing

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{Result, SyncError};

/// HTTP method subset used by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Transport-neutral outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST with a JSON-encoded body
    pub fn post_json<T: Serialize + ?Sized>(url: impl Into<String>, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body)?;
        Ok(Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/json; charset=utf-8".to_string(),
            )],
            body: Some(Bytes::from(encoded)),
        })
    }

    /// Set a header, replacing any existing value (case-insensitive name)
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Look up a header value (case-insensitive name)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-2xx response into [`SyncError::Api`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SyncError::Api {
                status: self.status,
                body: self.text(),
            })
        }
    }
}

/// Trait for sending one HTTP request
///
/// Implementations report network-level failures as
/// [`SyncError::Transport`] and return every HTTP status, including
/// errors, as an [`ApiResponse`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with the configured connect and request timeouts
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_s))
            .timeout(Duration::from_secs(config.request_timeout_s))
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("{:?} {} failed: {}", request.method, request.url, e)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::Transport(format!("Failed to read response body: {}", e)))?;

        debug!("{:?} {} -> {}", request.method, request.url, status);
        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted outcome
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Respond(u16, String),
        NetworkError,
    }

    type Hook = Box<dyn FnMut() + Send>;

    /// Transport that replays scripted outcomes and records every request
    #[derive(Clone, Default)]
    pub struct ScriptedTransport {
        pub requests: Arc<Mutex<Vec<ApiRequest>>>,
        pub script: Arc<Mutex<VecDeque<Scripted>>>,
        hook: Arc<Mutex<Option<Hook>>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, status: u16, body: &str) -> &Self {
            self.script
                .lock()
                .unwrap()
                .push_back(Scripted::Respond(status, body.to_string()));
            self
        }

        pub fn fail(&self) -> &Self {
            self.script.lock().unwrap().push_back(Scripted::NetworkError);
            self
        }

        /// Run `hook` inside every later `execute`, before it answers
        pub fn on_execute(&self, hook: impl FnMut() + Send + 'static) -> &Self {
            *self.hook.lock().unwrap() = Some(Box::new(hook));
            self
        }

        pub fn get_requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
            self.requests.lock().unwrap().push(request);
            if let Some(hook) = self.hook.lock().unwrap().as_mut() {
                hook();
            }
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Respond(status, body)) => Ok(ApiResponse::new(status, body)),
                Some(Scripted::NetworkError) => {
                    Err(SyncError::Transport("Mock network error".to_string()))
                }
                None => Err(SyncError::Transport("No scripted response left".to_string())),
            }
        }
    }
}
