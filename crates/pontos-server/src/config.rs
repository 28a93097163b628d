//! Runtime configuration, resolved once at startup.
//!
//! Components receive the pieces of configuration they need through their
//! constructors; nothing reads environment variables at call time.

use std::env;

use anyhow::Context;

/// Deployment environment, gating the unsigned-webhook override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Environments where unsigned webhooks are never accepted.
    pub fn is_production_like(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }

    fn parse(value: &str) -> Environment {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Alfred payment gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    /// Upper bound on any single gateway call, in seconds.
    pub timeout_secs: u64,
}

/// Webhook intake settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared HMAC secret; verification fails closed when unset.
    pub secret: Option<String>,
    /// Administrative kill switch for the whole webhook path.
    pub enabled: bool,
    /// Accept unsigned deliveries when no secret is configured.
    pub allow_unsigned: bool,
    /// Freshness window for the (transaction, status) idempotency check.
    pub replay_window_minutes: i64,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub environment: Environment,
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    /// When true, a terminal failure (FAILED/CANCELLED/EXPIRED) applied by
    /// a reconciler also releases the order's pending points back out of
    /// the balance. Off by default: pending points stay pending and are
    /// reconciled separately.
    pub release_pending_on_terminal_failure: bool,
}

impl AppConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<AppConfig> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let gateway = GatewayConfig {
            base_url: env::var("ALFRED_BASE_URL")
                .unwrap_or_else(|_| "https://api.alfredpay.io".to_string()),
            api_key: env::var("ALFRED_API_KEY").context("ALFRED_API_KEY must be set")?,
            timeout_secs: env_parse("ALFRED_TIMEOUT_SECS", 10)?,
        };

        let webhook = WebhookConfig {
            secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            enabled: env_parse("WEBHOOKS_ENABLED", true)?,
            allow_unsigned: env_parse("WEBHOOK_ALLOW_UNSIGNED", false)?,
            replay_window_minutes: env_parse("WEBHOOK_REPLAY_WINDOW_MINUTES", 60)?,
        };

        Ok(AppConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url,
            environment: Environment::parse(
                &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            ),
            gateway,
            webhook,
            release_pending_on_terminal_failure: env_parse("RELEASE_PENDING_ON_FAILURE", false)?,
        })
    }

    /// Whether unsigned webhooks may be accepted. The override is only
    /// honored outside production-like environments.
    pub fn allow_unsigned_webhooks(&self) -> bool {
        self.webhook.allow_unsigned && !self.environment.is_production_like()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}
