use serde::Deserialize;
use service_core::config::{self as core_config, get_env, Environment};
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub mongodb: MongoConfig,
    pub session: SessionConfig,
    pub invite: InviteConfig,
    pub store: StoreConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    File,
    Redis,
}

/// Where the session record and device id are kept on this installation.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub dir: String,
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteConfig {
    pub validity_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub tx_max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub app_id: String,
    pub brand: String,
    pub model: String,
    pub os_version: String,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let environment = Environment::current()?;
        let is_prod = environment.is_prod();

        let backend: SessionBackend = get_env("SESSION_BACKEND", Some("file"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let redis_url = match backend {
            SessionBackend::Redis => Some(get_env("REDIS_URL", None, is_prod)?),
            SessionBackend::File => None,
        };

        let config = AccessConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("ministry-access"), false)?,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("ministry"), is_prod)?,
            },
            session: SessionConfig {
                backend,
                dir: get_env("SESSION_DIR", Some(".ministry"), false)?,
                redis_url,
            },
            invite: InviteConfig {
                validity_days: get_env("INVITE_VALIDITY_DAYS", Some("365"), false)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "INVITE_VALIDITY_DAYS: {}",
                            e
                        ))
                    })?,
            },
            store: StoreConfig {
                tx_max_attempts: get_env("STORE_TX_MAX_ATTEMPTS", Some("5"), false)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "STORE_TX_MAX_ATTEMPTS: {}",
                            e
                        ))
                    })?,
            },
            device: DeviceConfig {
                app_id: get_env("DEVICE_APP_ID", Some("org.campus.ministry"), is_prod)?,
                brand: get_env("DEVICE_BRAND", Some("unknown"), false)?,
                model: get_env("DEVICE_MODEL", Some("unknown"), false)?,
                os_version: get_env("DEVICE_OS_VERSION", Some("unknown"), false)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.invite.validity_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INVITE_VALIDITY_DAYS must be positive"
            )));
        }

        if self.store.tx_max_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_TX_MAX_ATTEMPTS must be at least 1"
            )));
        }

        if self.device.app_id.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEVICE_APP_ID must not be empty"
            )));
        }

        Ok(())
    }
}

impl std::str::FromStr for SessionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(SessionBackend::File),
            "redis" => Ok(SessionBackend::Redis),
            _ => Err(format!("Invalid session backend: {}", s)),
        }
    }
}
