//! Store configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SATCHEL_API_URL` - Base URL of the remote collection API
//! - `SATCHEL_API_TOKEN` - Storefront access token sent with every remote call
//!
//! ## Optional
//! - `SATCHEL_DATA_DIR` - Directory for the local collection slots (default: .satchel)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Shortest storefront access token the API issues.
const MIN_TOKEN_LEN: usize = 16;

/// Issued tokens are random; anything below this reads as hand-typed.
const MIN_TOKEN_ENTROPY: f64 = 3.3;

/// Fragments of copy-pasted sample values (matched case-insensitively).
const SAMPLE_TOKEN_MARKERS: &[&str] = &[
    "your-",
    "changeme",
    "placeholder",
    "example",
    "sample",
    "dummy",
    "xxxx",
    "token-here",
    "insert",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Remote collection API configuration
    pub api: RemoteApiConfig,
    /// Directory holding the local collection slots
    pub data_dir: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Remote collection API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct RemoteApiConfig {
    /// Base URL; collection paths (`cart`, `wishlist`) are joined onto it
    pub base_url: Url,
    /// Storefront access token (server-issued, identifies this storefront)
    pub access_token: SecretString,
}

impl std::fmt::Debug for RemoteApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid, or
    /// if the access token looks like a sample value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api = RemoteApiConfig::from_env()?;
        let data_dir = PathBuf::from(env_var("SATCHEL_DATA_DIR").as_deref().unwrap_or(".satchel"));
        let sentry_dsn = env_var("SENTRY_DSN");
        let sentry_environment = env_var("SENTRY_ENVIRONMENT");

        Ok(Self {
            api,
            data_dir,
            sentry_dsn,
            sentry_environment,
        })
    }
}

impl RemoteApiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw = required_env("SATCHEL_API_URL")?;
        let base_url = parse_base_url(&raw)
            .map_err(|e| ConfigError::InvalidEnvVar("SATCHEL_API_URL".to_string(), e))?;

        let token = required_env("SATCHEL_API_TOKEN")?;
        check_access_token(&token).map_err(|reason| {
            ConfigError::InsecureSecret("SATCHEL_API_TOKEN".to_string(), reason)
        })?;

        Ok(Self {
            base_url,
            access_token: SecretString::from(token),
        })
    }
}

/// Parse an API base URL, normalizing it to end with `/` so relative
/// collection paths join underneath it rather than replacing its last segment.
///
/// # Errors
///
/// Returns a description of the problem if the URL does not parse or is not
/// http(s).
pub fn parse_base_url(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// =============================================================================
// Environment
// =============================================================================

/// Read a variable, treating a blank value (`KEY=` in `.env`) as unset.
fn env_var(key: &str) -> Option<String> {
    non_blank(std::env::var(key).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    env_var(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Reject access tokens that were pasted from docs or typed by hand.
fn check_access_token(token: &str) -> Result<(), String> {
    let lower = token.to_lowercase();
    if let Some(marker) = SAMPLE_TOKEN_MARKERS.iter().find(|m| lower.contains(*m)) {
        return Err(format!("looks like a sample value (contains '{marker}')"));
    }

    let len = token.chars().count();
    if len < MIN_TOKEN_LEN {
        return Err(format!("too short ({len} chars, need >= {MIN_TOKEN_LEN})"));
    }

    let entropy = entropy_per_char(token);
    if entropy < MIN_TOKEN_ENTROPY {
        return Err(format!(
            "too repetitive ({entropy:.2} bits/char, need >= {MIN_TOKEN_ENTROPY:.1}); use the token issued by the API"
        ));
    }
    Ok(())
}

/// Shannon entropy of `s` in bits per character.
#[allow(clippy::cast_precision_loss)] // Token lengths are tiny
fn entropy_per_char(s: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
    }

    let total = s.chars().count() as f64;
    counts
        .values()
        .map(|&n| n as f64 / total)
        .map(|p| -p * p.log2())
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_accepted() {
        assert!(check_access_token("storefront-Zq81xLr2Hc47pWm9").is_ok());
    }

    #[test]
    fn test_sample_token_rejected() {
        let reason = check_access_token("your-storefront-token-here").unwrap_err();
        assert!(reason.contains("your-"));
        assert!(check_access_token("EXAMPLE-Zq81xLr2Hc47pWm9").is_err());
    }

    #[test]
    fn test_short_or_repetitive_token_rejected() {
        assert!(check_access_token("Zq81xLr2").unwrap_err().contains("too short"));
        assert!(
            check_access_token("abababababababababab")
                .unwrap_err()
                .contains("too repetitive")
        );
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("   ".to_string())), None);
        assert_eq!(non_blank(Some(" .data ".to_string())), Some(".data".to_string()));
    }

    #[test]
    fn test_parse_base_url_appends_slash() {
        let url = parse_base_url("https://api.example.test/v1").unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/v1/");
        assert_eq!(
            url.join("cart").unwrap().as_str(),
            "https://api.example.test/v1/cart"
        );
    }

    #[test]
    fn test_parse_base_url_rejects_other_schemes() {
        assert!(parse_base_url("ftp://api.example.test").is_err());
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_remote_config_debug_redacts_token() {
        let config = RemoteApiConfig {
            base_url: parse_base_url("http://127.0.0.1:8080").unwrap(),
            access_token: SecretString::from("Zq81xLr2Hc47pWm9"),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("127.0.0.1:8080"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("Zq81xLr2Hc47pWm9"));
    }
}
