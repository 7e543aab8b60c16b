//! Persisted login state (`jwt` and `refreshToken`)

use tracing::info;

use crate::error::Result;
use crate::storage::KvNamespace;

pub const JWT_KEY: &str = "jwt";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Token store backed by the auth namespace
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone)]
pub struct Credentials {
    namespace: KvNamespace,
}

impl Credentials {
    pub fn new(namespace: KvNamespace) -> Self {
        Self { namespace }
    }

    /// Short-lived access token
    pub fn token(&self) -> Option<String> {
        self.namespace.get(JWT_KEY).filter(|t| !t.is_empty())
    }

    /// Long-lived refresh token
    pub fn refresh_token(&self) -> Option<String> {
        self.namespace.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    /// Store both tokens after a successful login
    ///
    /// A login response without a refresh token removes any stale one.
    pub fn save_login(&self, token: &str, refresh_token: Option<&str>) -> Result<()> {
        self.namespace.put(JWT_KEY, token)?;
        match refresh_token {
            Some(refresh) => self.namespace.put(REFRESH_TOKEN_KEY, refresh)?,
            None => self.namespace.remove(&[REFRESH_TOKEN_KEY])?,
        }
        info!("Stored credentials (token {})", redact(token));
        Ok(())
    }

    /// Replace the access token after a refresh
    pub fn save_token(&self, token: &str) -> Result<()> {
        self.namespace.put(JWT_KEY, token)?;
        info!("Stored refreshed token {}", redact(token));
        Ok(())
    }

    /// Remove every stored credential
    pub fn clear(&self) -> Result<()> {
        self.namespace.remove(&[JWT_KEY, REFRESH_TOKEN_KEY])
    }
}

/// Short printable prefix of a secret
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{}…", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AUTH_NAMESPACE;
    use tempfile::TempDir;

    fn credentials(dir: &TempDir) -> Credentials {
        Credentials::new(KvNamespace::open(dir.path(), AUTH_NAMESPACE).unwrap())
    }

    #[test]
    fn test_fresh_store_is_logged_out() {
        let dir = TempDir::new().unwrap();
        let creds = credentials(&dir);
        assert!(!creds.is_logged_in());
        assert_eq!(creds.token(), None);
        assert_eq!(creds.refresh_token(), None);
    }

    #[test]
    fn test_save_login() {
        let dir = TempDir::new().unwrap();
        let creds = credentials(&dir);
        creds.save_login("jwt-1", Some("refresh-1")).unwrap();

        assert!(creds.is_logged_in());
        assert_eq!(creds.token().as_deref(), Some("jwt-1"));
        assert_eq!(creds.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_login_without_refresh_drops_stale_refresh() {
        let dir = TempDir::new().unwrap();
        let creds = credentials(&dir);
        creds.save_login("jwt-1", Some("refresh-1")).unwrap();
        creds.save_login("jwt-2", None).unwrap();

        assert_eq!(creds.refresh_token(), None);
    }

    #[test]
    fn test_save_token_keeps_refresh() {
        let dir = TempDir::new().unwrap();
        let creds = credentials(&dir);
        creds.save_login("jwt-1", Some("refresh-1")).unwrap();
        creds.save_token("jwt-2").unwrap();

        assert_eq!(creds.token().as_deref(), Some("jwt-2"));
        assert_eq!(creds.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_empty_token_is_absent() {
        let dir = TempDir::new().unwrap();
        let creds = credentials(&dir);
        creds.save_login("", Some("")).unwrap();

        assert!(!creds.is_logged_in());
        assert_eq!(creds.refresh_token(), None);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let creds = credentials(&dir);
        creds.save_login("jwt-1", Some("refresh-1")).unwrap();
        creds.clear().unwrap();

        assert!(!creds.is_logged_in());
        assert_eq!(creds.refresh_token(), None);
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("eyJhbGciOiJIUzI1NiJ9"), "eyJhbG…");
        assert_eq!(redact("abc"), "abc…");
    }
}
