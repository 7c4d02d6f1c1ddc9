//! Configuration for the remote key set keystore.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default deadline for a single key set fetch (10 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`RemoteJwksKeystore`](crate::RemoteJwksKeystore).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use portal_common_authn::RemoteJwksConfig;
///
/// let config: RemoteJwksConfig = serde_json::from_str(
///     r#"{"url": "https://auth.example.com/jwks", "cache_ttl": "5m"}"#,
/// )?;
/// assert_eq!(config.timeout, Duration::from_secs(10));
/// assert_eq!(config.cache_ttl, Some(Duration::from_secs(300)));
/// assert!(!config.allow_http);
///
/// let config = RemoteJwksConfig::builder().url("https://auth.example.com/jwks").build();
/// assert!(config.cache_ttl.is_none());
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteJwksConfig {
    /// Key set endpoint.
    #[builder(into)]
    pub url: String,

    /// Deadline for one fetch, including reading the body.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    #[builder(default = default_timeout())]
    pub timeout: Duration,

    /// How long a fetched key set is reused. `None` keeps it for the
    /// lifetime of the keystore.
    #[serde(with = "humantime_serde", default)]
    pub cache_ttl: Option<Duration>,

    /// Period of the background refresh task started by
    /// [`RemoteJwksKeystore::start`](crate::RemoteJwksKeystore::start).
    /// `None` disables it.
    #[serde(with = "humantime_serde", default)]
    pub refresh_interval: Option<Duration>,

    /// Permit plain `http://` endpoints. Only meant for tests and local
    /// development.
    #[serde(default)]
    #[builder(default)]
    pub allow_http: bool,
}

fn default_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document() {
        let config: RemoteJwksConfig =
            serde_json::from_str(r#"{"url": "https://auth.example.com/jwks"}"#).unwrap();
        assert_eq!(config.timeout, DEFAULT_FETCH_TIMEOUT);
        assert!(config.cache_ttl.is_none());
        assert!(config.refresh_interval.is_none());
        assert!(!config.allow_http);
    }

    #[test]
    fn test_humantime_durations() {
        let config: RemoteJwksConfig = serde_json::from_str(
            r#"{"url": "http://localhost/jwks", "timeout": "250ms", "refresh_interval": "1m", "allow_http": true}"#,
        )
        .unwrap();
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.refresh_interval, Some(Duration::from_secs(60)));
        assert!(config.allow_http);
    }

    #[test]
    fn test_url_required() {
        let result: Result<RemoteJwksConfig, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<RemoteJwksConfig, _> =
            serde_json::from_str(r#"{"url": "https://a/jwks", "retries": 3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_builder() {
        let config = RemoteJwksConfig::builder()
            .url("https://auth.example.com/jwks")
            .cache_ttl(Duration::from_secs(30))
            .build();
        assert_eq!(config.timeout, DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.cache_ttl, Some(Duration::from_secs(30)));
    }
}
