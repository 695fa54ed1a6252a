use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use praetor_application::EngineConfig;
use praetor_core::AppError;
use tracing_subscriber::EnvFilter;

const INTERNAL_API_TOKEN_MIN_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Postgres { database_url: String },
    Memory,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub store: StoreConfig,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub api_host: String,
    pub api_port: u16,
    pub internal_api_token: String,
    pub engine: EngineConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_lookup(migrate_only, |name| env::var(name).ok())
    }

    pub fn from_lookup(
        migrate_only: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let store = match optional("PRAETOR_STORE")
            .unwrap_or_else(|| "postgres".to_owned())
            .as_str()
        {
            "postgres" => StoreConfig::Postgres {
                database_url: optional("DATABASE_URL")
                    .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?,
            },
            "memory" => StoreConfig::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "PRAETOR_STORE must be either 'postgres' or 'memory', got '{other}'"
                )));
            }
        };

        if migrate_only && store == StoreConfig::Memory {
            return Err(AppError::Validation(
                "the migrate command requires PRAETOR_STORE=postgres".to_owned(),
            ));
        }

        let internal_api_token = optional("INTERNAL_API_TOKEN")
            .ok_or_else(|| AppError::Validation("INTERNAL_API_TOKEN is required".to_owned()))?;
        if internal_api_token.len() < INTERNAL_API_TOKEN_MIN_LENGTH {
            return Err(AppError::Validation(format!(
                "INTERNAL_API_TOKEN must be at least {INTERNAL_API_TOKEN_MIN_LENGTH} characters"
            )));
        }

        let api_host = optional("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = parse_or("API_PORT", optional("API_PORT"), 3001_u16)?;

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            max_hierarchy_depth: parse_or(
                "RBAC_MAX_HIERARCHY_DEPTH",
                optional("RBAC_MAX_HIERARCHY_DEPTH"),
                defaults.max_hierarchy_depth,
            )?,
            permission_cache_ttl_seconds: parse_or(
                "RBAC_PERMISSION_CACHE_TTL_SECONDS",
                optional("RBAC_PERMISSION_CACHE_TTL_SECONDS"),
                defaults.permission_cache_ttl_seconds,
            )?,
            audit_successful_checks: optional("RBAC_AUDIT_SUCCESSFUL_CHECKS")
                .is_some_and(|value| value.eq_ignore_ascii_case("true")),
        };
        engine.validate()?;

        Ok(Self {
            migrate_only,
            store,
            redis_url: optional("REDIS_URL"),
            redis_key_prefix: optional("REDIS_KEY_PREFIX")
                .unwrap_or_else(|| "praetor:permissions".to_owned()),
            api_host,
            api_port,
            internal_api_token,
            engine,
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

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}
