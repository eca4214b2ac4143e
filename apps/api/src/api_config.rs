use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use qrotate_core::AppError;
use qrotate_domain::{
    DEFAULT_INTERVAL_SECONDS, DEFAULT_LAST_SCAN_TTL_SECONDS, DEFAULT_MAX_INTERVAL_SECONDS,
    DEFAULT_STALENESS_THRESHOLD_SECONDS, DEFAULT_TICK_LEASE_SECONDS, RotationSettings,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub database_url: Option<String>,
    pub dev_company_tokens: String,
    pub recent_search_file: Option<PathBuf>,
    pub instance_id: String,
    pub rotation_settings: RotationSettings,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let redis_url = optional_non_empty_env("REDIS_URL");
        let redis_key_prefix =
            optional_non_empty_env("REDIS_KEY_PREFIX").unwrap_or_else(|| "qrotate".to_owned());
        let database_url = optional_non_empty_env("DATABASE_URL");
        let dev_company_tokens = env::var("DEV_COMPANY_TOKENS").unwrap_or_default();
        let recent_search_file = optional_non_empty_env("RECENT_SEARCH_FILE").map(PathBuf::from);
        let instance_id = optional_non_empty_env("API_INSTANCE_ID")
            .unwrap_or_else(|| format!("api-{}", std::process::id()));

        let rotation_settings = RotationSettings::new(
            parse_env_u32("QR_DEFAULT_INTERVAL_SECONDS", DEFAULT_INTERVAL_SECONDS)?,
            parse_env_u32(
                "QR_STALENESS_THRESHOLD_SECONDS",
                DEFAULT_STALENESS_THRESHOLD_SECONDS,
            )?,
            parse_env_u32("QR_LAST_SCAN_TTL_SECONDS", DEFAULT_LAST_SCAN_TTL_SECONDS)?,
            parse_env_u32("QR_TICK_LEASE_SECONDS", DEFAULT_TICK_LEASE_SECONDS)?,
            parse_env_u32("QR_MAX_INTERVAL_SECONDS", DEFAULT_MAX_INTERVAL_SECONDS)?,
        )?;

        Ok(Self {
            frontend_url,
            api_host,
            api_port,
            redis_url,
            redis_key_prefix,
            database_url,
            dev_company_tokens,
            recent_search_file,
            instance_id,
            rotation_settings,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn optional_non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, AppError> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
