//! Bot configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SLACK_BOT_TOKEN` - Slack bot token (xoxb-...)
//! - `SLACK_SIGNING_SECRET` - Slack app signing secret
//! - `ORG_CUSTOMER_ID` - Google Workspace customer ID owning the groups
//! - `APPROVER_GROUP_ID` - Slack user group allowed to approve requests
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8080)
//! - `SNAPSHOT_REFRESH_SECS` - Directory refresh interval (default: 60)
//! - `REQUEST_TTL_HOURS` - Lifetime of an undecided request (default: 24)
//! - `REVOCATION_WORKERS` - Revocation worker count (default: 4)
//! - `OPERATION_DEADLINE_SECS` - Max wait for a directory operation (default: 120)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Traces sample rate (default: 0.1)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use gatekeeper_core::UserGroupId;
use secrecy::SecretString;
use thiserror::Error;

use crate::directory::PollerConfig;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const BOT_TOKEN_PREFIX: &str = "xoxb-";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
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

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Slack credentials
    pub slack: SlackConfig,
    /// Google Workspace customer ID (`customers/{id}` parent of all groups)
    pub org_customer_id: String,
    /// Slack user group whose members may approve requests
    pub approver_group_id: UserGroupId,
    /// Directory snapshot refresh interval
    pub snapshot_refresh: Duration,
    /// How long an undecided request stays actionable
    pub request_ttl: Duration,
    /// Number of revocation workers
    pub revocation_workers: usize,
    /// Directory operation polling
    pub poller: PollerConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Slack credentials.
///
/// Implements `Debug` manually to redact secrets.
#[derive(Clone)]
pub struct SlackConfig {
    /// Slack bot token (xoxb-...).
    pub bot_token: SecretString,
    /// Slack app signing secret for request verification.
    pub signing_secret: SecretString,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &"[REDACTED]")
            .field("signing_secret", &"[REDACTED]")
            .finish()
    }
}

impl BotConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let host = env.parsed_or("HOST", "0.0.0.0")?;
        let port = env.parsed_or("PORT", "8080")?;
        let slack = SlackConfig::from_env(&env)?;
        let org_customer_id = env.required("ORG_CUSTOMER_ID")?;
        let approver_group_id = UserGroupId::new(env.required("APPROVER_GROUP_ID")?);

        let snapshot_refresh = Duration::from_secs(env.positive("SNAPSHOT_REFRESH_SECS", 60)?);
        let request_ttl = Duration::from_secs(env.positive("REQUEST_TTL_HOURS", 24)? * 3600);
        let revocation_workers = usize::try_from(env.positive("REVOCATION_WORKERS", 4)?)
            .map_err(|e| ConfigError::InvalidEnvVar("REVOCATION_WORKERS".to_string(), e.to_string()))?;
        let poller = PollerConfig {
            deadline: Duration::from_secs(env.parsed_or("OPERATION_DEADLINE_SECS", "120")?),
            ..PollerConfig::default()
        };

        let sentry_dsn = env.optional("SENTRY_DSN");
        let sentry_environment = env.optional("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = env
            .optional("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = env
            .optional("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            host,
            port,
            slack,
            org_customer_id,
            approver_group_id,
            snapshot_refresh,
            request_ttl,
            revocation_workers,
            poller,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl SlackConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let bot_token = env.required("SLACK_BOT_TOKEN")?;
        if !bot_token.starts_with(BOT_TOKEN_PREFIX) {
            return Err(ConfigError::InvalidEnvVar(
                "SLACK_BOT_TOKEN".to_string(),
                format!("must have the prefix \"{BOT_TOKEN_PREFIX}\""),
            ));
        }

        let signing_secret = env.required("SLACK_SIGNING_SECRET")?;
        if let Err(e) = validate_secret_strength(&signing_secret, "SLACK_SIGNING_SECRET") {
            tracing::warn!("SLACK_SIGNING_SECRET validation warning: {e}");
        }

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            signing_secret: SecretString::from(signing_secret),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with the usual accessors.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get a required, non-empty variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable; empty counts as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Parse a variable, falling back to `default`.
    fn parsed_or<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .as_deref()
            .unwrap_or(default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Parse a strictly positive integer, falling back to `default`.
    fn positive(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        let value: u64 = self.parsed_or(key, &default.to_string())?;
        if value == 0 {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(value)
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
