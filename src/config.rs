/// Environment-based configuration.
///
/// Only the binary reads the environment; the library receives a `Config` value.

use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_INPUT_SIZE: u32 = 512;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub auth_token: Option<String>,
    pub input_size: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_token: None,
            input_size: DEFAULT_INPUT_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api_url: lookup("API_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            auth_token: lookup("AUTH_TOKEN").filter(|v| !v.trim().is_empty()),
            input_size: lookup("MODEL_INPUT_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(DEFAULT_INPUT_SIZE),
            max_retries: lookup("MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay_ms: lookup("RETRY_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            jpeg_quality: lookup("JPEG_QUALITY")
                .and_then(|v| v.parse().ok())
                .filter(|&v| (1..=100).contains(&v))
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Base address without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// `Authorization` header value, if a credential is configured.
    pub fn authorization(&self) -> Option<String> {
        let token = self.auth_token.as_deref()?.trim();
        if token.is_empty() {
            None
        } else if token.starts_with("Bearer ") {
            Some(token.to_string())
        } else {
            Some(format!("Bearer {token}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.input_size, 512);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert!(config.authorization().is_none());
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("MODEL_INPUT_SIZE", "0"),
            ("MAX_RETRIES", "many"),
            ("JPEG_QUALITY", "250"),
        ]));
        assert_eq!(config.input_size, DEFAULT_INPUT_SIZE);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.jpeg_quality, DEFAULT_JPEG_QUALITY);
    }

    #[test]
    fn bearer_prefix_is_added_once() {
        let config = Config::from_lookup(lookup(&[
            ("API_URL", "https://example.test/"),
            ("AUTH_TOKEN", "abc.def"),
        ]));
        assert_eq!(config.base_url(), "https://example.test");
        assert_eq!(config.authorization().as_deref(), Some("Bearer abc.def"));

        let prefixed = config.with_auth_token(Some("Bearer abc.def".into()));
        assert_eq!(prefixed.authorization().as_deref(), Some("Bearer abc.def"));
    }
}
