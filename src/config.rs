use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "EGP";
const DEFAULT_SIGNUP_BONUS: i64 = 50;
const DEFAULT_MAX_SPEND_RETRIES: u32 = 5;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Coin wallet settings
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CoinsConfig {
    /// Coins granted once when a wallet is provisioned through a balance query
    #[serde(default = "default_signup_bonus")]
    #[validate(range(min = 0))]
    pub signup_bonus: i64,

    /// Optimistic-concurrency retries before a balance change gives up
    #[serde(default = "default_max_spend_retries")]
    #[validate(range(min = 1, max = 50))]
    pub max_spend_retries: u32,
}

impl Default for CoinsConfig {
    fn default() -> Self {
        Self {
            signup_bonus: default_signup_bonus(),
            max_spend_retries: default_max_spend_retries(),
        }
    }
}

/// Kashier hosted payment page settings
#[derive(Clone, Debug, Deserialize)]
pub struct KashierConfig {
    pub merchant_id: String,
    /// API key, used both for the checkout hash and webhook signatures
    pub api_key: String,
    #[serde(default = "default_kashier_mode")]
    pub mode: String,
    #[serde(default = "default_kashier_checkout_url")]
    pub checkout_url: String,
    pub redirect_url: Option<String>,
    pub webhook_url: Option<String>,
}

/// PayPal Orders v2 settings
#[derive(Clone, Debug, Deserialize)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_paypal_base_url")]
    pub base_url: String,
    pub return_url: String,
    pub cancel_url: String,
    /// Shared secret used by the webhook relay to sign forwarded events
    pub webhook_secret: String,
}

/// Apple Pay processor settings
#[derive(Clone, Debug, Deserialize)]
pub struct ApplePayConfig {
    pub merchant_id: String,
    pub webhook_secret: String,
}

/// External AI text generation settings
#[derive(Clone, Debug, Deserialize)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Coins quoted before a generation request runs
    pub cost_per_request: i64,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// ISO 4217 currency used for orders and gateway sessions
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    #[serde(default)]
    #[validate]
    pub coins: CoinsConfig,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: u64,

    #[serde(default)]
    pub kashier: Option<KashierConfig>,

    #[serde(default)]
    pub paypal: Option<PayPalConfig>,

    #[serde(default)]
    pub apple_pay: Option<ApplePayConfig>,

    /// Mail relay that receives download delivery notices; logged only when unset
    #[serde(default)]
    pub delivery_webhook_url: Option<String>,

    #[serde(default)]
    pub generation: Option<GenerationConfig>,

    /// Comma-separated allowed CORS origins; permissive outside production when unset
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            default_currency: default_currency(),
            coins: CoinsConfig::default(),
            payment_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            kashier: None,
            paypal: None,
            apple_pay: None,
            delivery_webhook_url: None,
            generation: None,
            cors_allowed_origins: None,
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_signup_bonus() -> i64 {
    DEFAULT_SIGNUP_BONUS
}

fn default_max_spend_retries() -> u32 {
    DEFAULT_MAX_SPEND_RETRIES
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_kashier_mode() -> String {
    "test".to_string()
}

fn default_kashier_checkout_url() -> String {
    "https://checkout.kashier.io".to_string()
}

fn default_paypal_base_url() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("coin_commerce={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let default_file = config_dir.join("default");
    let env_file = config_dir.join(&run_env);

    let config = Config::builder()
        .set_default("database_url", "sqlite://coin_commerce.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&default_file.to_string_lossy()).required(false))
        .add_source(File::with_name(&env_file.to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
