use secrecy::{ExposeSecret, SecretString};

/// Wraps an API key with secrecy protection (zeroized on drop, redacted in Debug).
#[derive(Clone)]
pub struct ApiKey(pub SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Empty keys count as "not configured".
    pub fn is_configured(&self) -> bool {
        !self.0.expose_secret().is_empty()
    }

    /// Only used when building a child process environment.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Default for ApiKey {
    fn default() -> Self {
        Self::new("")
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}
