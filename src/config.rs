//! Application configuration management.
//!
//! Raw environment variables are deserialized with `envy` and then validated
//! into [`Config`]. Invalid combinations (most importantly an unsigned-webhook
//! bypass in production) fail at startup instead of at request time.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Deployment environment. Only `production` hardens webhook verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

/// Raw environment variables, before validation.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `PUBLIC_BASE_URL` (required): public origin of the web app
/// - `SESSION_SECRET` (required): HS256 key for session claims, 32+ bytes
/// - `SERVER_PORT`: defaults to 3000
/// - `APP_ENV`: `development` (default) or `production`
/// - `STRIPE_SECRET_KEY`, `STRIPE_API_URL`, `STRIPE_WEBHOOK_SECRET`
/// - `ALLOW_UNSIGNED_WEBHOOKS`: development-only signature bypass
/// - `WEBHOOK_TOLERANCE_SECS`, `CURRENCY`, `DB_MAX_CONNECTIONS`,
///   `DB_ACQUIRE_TIMEOUT_SECS`, `GATEWAY_TIMEOUT_SECS`
#[derive(Debug, Deserialize)]
struct RawConfig {
    database_url: String,
    public_base_url: String,
    session_secret: String,

    #[serde(default = "default_port")]
    server_port: u16,

    #[serde(default = "default_environment")]
    app_env: Environment,

    stripe_secret_key: Option<String>,

    #[serde(default = "default_stripe_api_url")]
    stripe_api_url: String,

    stripe_webhook_secret: Option<String>,

    #[serde(default)]
    allow_unsigned_webhooks: bool,

    #[serde(default = "default_webhook_tolerance")]
    webhook_tolerance_secs: u64,

    #[serde(default = "default_currency")]
    currency: String,

    #[serde(default = "default_max_connections")]
    db_max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    db_acquire_timeout_secs: u64,

    #[serde(default = "default_gateway_timeout")]
    gateway_timeout_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_stripe_api_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_webhook_tolerance() -> u64 {
    300
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_gateway_timeout() -> u64 {
    10
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("ALLOW_UNSIGNED_WEBHOOKS cannot be enabled when APP_ENV=production")]
    UnsignedWebhooksInProduction,

    #[error("STRIPE_WEBHOOK_SECRET is required when APP_ENV=production")]
    MissingWebhookSecret,

    #[error("SESSION_SECRET must be at least 32 bytes")]
    WeakSessionSecret,

    #[error("{0} is not a valid URL")]
    InvalidUrl(&'static str),

    #[error("CURRENCY must be a 3-letter code")]
    InvalidCurrency,
}

/// Proof that the development webhook bypass was granted by configuration.
///
/// The field is private, so the only way to obtain one is
/// [`WebhookVerification::from_settings`], which refuses in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevelopmentBypass(());

/// How inbound gateway webhooks are authenticated.
#[derive(Debug, Clone)]
pub enum WebhookVerification {
    /// HMAC-SHA256 over `"{timestamp}.{body}"`, timestamp within `tolerance`.
    Signed {
        secret: SecretString,
        tolerance: Duration,
    },
    /// Payloads are trusted without a signature. Development only.
    Unverified(DevelopmentBypass),
    /// No secret and no bypass: every webhook is refused with a 500.
    Unconfigured,
}

impl WebhookVerification {
    pub fn from_settings(
        environment: Environment,
        secret: Option<SecretString>,
        allow_unsigned: bool,
        tolerance: Duration,
    ) -> Result<Self, ConfigError> {
        if allow_unsigned && environment == Environment::Production {
            return Err(ConfigError::UnsignedWebhooksInProduction);
        }

        match (secret, allow_unsigned) {
            (Some(secret), _) => Ok(WebhookVerification::Signed { secret, tolerance }),
            (None, true) => Ok(WebhookVerification::Unverified(DevelopmentBypass(()))),
            (None, false) if environment == Environment::Production => {
                Err(ConfigError::MissingWebhookSecret)
            }
            (None, false) => Ok(WebhookVerification::Unconfigured),
        }
    }

    /// Signed verification with the default five minute tolerance.
    pub fn signed(secret: impl Into<String>) -> Self {
        WebhookVerification::Signed {
            secret: SecretString::from(secret.into()),
            tolerance: Duration::from_secs(default_webhook_tolerance()),
        }
    }
}

/// Stripe-compatible gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_url: String,
    pub secret_key: Option<SecretString>,
    pub timeout: Duration,
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    pub environment: Environment,
    pub public_base_url: String,
    pub session_secret: SecretString,
    pub currency: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub gateway: GatewayConfig,
    pub webhook_verification: WebhookVerification,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file first (optional), then reads and
    /// validates the environment.
    ///
    /// # Errors
    ///
    /// - Required variables missing or unparsable
    /// - Unsigned webhooks requested in production, or no webhook secret in production
    /// - Malformed URLs, short session secret, bad currency code
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let raw = envy::from_env::<RawConfig>()?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.session_secret.len() < 32 {
            return Err(ConfigError::WeakSessionSecret);
        }

        url::Url::parse(&raw.public_base_url)
            .map_err(|_| ConfigError::InvalidUrl("PUBLIC_BASE_URL"))?;
        url::Url::parse(&raw.stripe_api_url)
            .map_err(|_| ConfigError::InvalidUrl("STRIPE_API_URL"))?;

        let currency = raw.currency.to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidCurrency);
        }

        let webhook_verification = WebhookVerification::from_settings(
            raw.app_env,
            raw.stripe_webhook_secret.map(SecretString::from),
            raw.allow_unsigned_webhooks,
            Duration::from_secs(raw.webhook_tolerance_secs),
        )?;

        Ok(Config {
            database_url: raw.database_url,
            server_port: raw.server_port,
            environment: raw.app_env,
            public_base_url: raw.public_base_url.trim_end_matches('/').to_string(),
            session_secret: SecretString::from(raw.session_secret),
            currency,
            db_max_connections: raw.db_max_connections,
            db_acquire_timeout: Duration::from_secs(raw.db_acquire_timeout_secs),
            gateway: GatewayConfig {
                api_url: raw.stripe_api_url.trim_end_matches('/').to_string(),
                secret_key: raw.stripe_secret_key.map(SecretString::from),
                timeout: Duration::from_secs(raw.gateway_timeout_secs),
            },
            webhook_verification,
        })
    }
}
