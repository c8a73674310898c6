use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bradax_telemetry::writer::DEFAULT_INTERACTIONS_CAP;

/// Minimum acceptable master-secret entropy, in bytes.
const MIN_MASTER_SECRET_BYTES: usize = 32;

/// Deployment environment, selected by the `ENV` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidValue {
                name: "ENV",
                value: other.to_owned(),
            }),
        }
    }
}

/// The master secret all per-project keys derive from. Never printed.
#[derive(Clone)]
pub struct MasterSecret(String);

impl MasterSecret {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(***)")
    }
}

/// Rate limiter bounds.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub requests_per_minute: u64,
    pub requests_per_hour: u64,
    pub max_concurrent: usize,
}

/// All runtime options, assembled once from environment lookups.
///
/// Handlers never consult the environment directly; tunables travel with
/// this struct.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub environment: Environment,
    pub master_secret: MasterSecret,
    pub provider_api_key: String,
    pub provider_base_url: String,
    pub jwt_expiry_minutes: u64,
    pub rate_limit: RateLimitSettings,
    pub provider_timeout: Duration,
    pub interactions_cap: usize,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Host headers accepted by the trusted-host filter; `None` accepts any.
    pub trusted_hosts: Option<Vec<String>>,
}

/// Errors that refuse startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("MASTER_JWT_SECRET must be at least {MIN_MASTER_SECRET_BYTES} bytes, got {0}")]
    WeakSecret(usize),

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

impl BrokerConfig {
    /// Assemble the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Assemble the configuration from an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let master_secret = lookup("MASTER_JWT_SECRET")
            .ok_or(ConfigError::MissingVar("MASTER_JWT_SECRET"))?;
        if master_secret.len() < MIN_MASTER_SECRET_BYTES {
            return Err(ConfigError::WeakSecret(master_secret.len()));
        }

        let provider_api_key = lookup("PROVIDER_API_KEY")
            .ok_or(ConfigError::MissingVar("PROVIDER_API_KEY"))?;

        let environment = match lookup("ENV") {
            Some(value) => value.parse()?,
            None => Environment::Development,
        };

        Ok(Self {
            environment,
            master_secret: MasterSecret(master_secret),
            provider_api_key,
            provider_base_url: lookup("PROVIDER_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_owned()),
            jwt_expiry_minutes: parse_or("JWT_EXPIRE_MINUTES", &lookup, 15)?,
            rate_limit: RateLimitSettings {
                requests_per_minute: parse_or("RATE_LIMIT_RPM", &lookup, 60)?,
                requests_per_hour: parse_or("RATE_LIMIT_RPH", &lookup, 1_000)?,
                max_concurrent: parse_or("MAX_CONCURRENT", &lookup, 10)?,
            },
            provider_timeout: Duration::from_secs(parse_or(
                "PROVIDER_TIMEOUT_SECONDS",
                &lookup,
                180,
            )?),
            interactions_cap: parse_or("INTERACTIONS_CAP", &lookup, DEFAULT_INTERACTIONS_CAP)?,
            data_dir: lookup("DATA_DIR").map_or_else(|| PathBuf::from("data"), PathBuf::from),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or("PORT", &lookup, 8_000)?,
            trusted_hosts: lookup("TRUSTED_HOSTS").map(|hosts| {
                hosts
                    .split(',')
                    .map(|h| h.trim().to_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect()
            }),
        })
    }
}

fn parse_or<T: FromStr>(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            name,
            value,
        }),
    }
}
