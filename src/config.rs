use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use url::Url;
use crate::error::{AppError, Result};

pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-lite-001";
pub const DEFAULT_COMPLETION_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_COMPRESSION_PROMPT: &str = "Process the following content according to the user's instruction. Preserve key facts, names, numbers, and actionable information. Output only the result, no preamble.";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub executor_url: String,
    pub cache_ttl: Duration,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub openrouter_base_url: String,
    pub compression_prompt: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        // Blank credentials count as unset
        let secret = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = var_or("HOST", "0.0.0.0");
        let port = var_or("PORT", "8000");
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let redis_port = var_or("REDIS_PORT", "6379");
        let redis_port = redis_port
            .parse::<u16>()
            .map_err(|e| AppError::ConfigError(format!("Invalid REDIS_PORT: {}", e)))?;

        let cache_ttl = match lookup("CACHE_TTL_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| AppError::ConfigError(format!("Invalid CACHE_TTL_SECONDS: {}", e)))?,
            None => DEFAULT_CACHE_TTL_SECS,
        };
        // SETEX rejects a zero expiry
        if cache_ttl == 0 {
            return Err(AppError::ConfigError(
                "CACHE_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            redis_host: var_or("REDIS_HOST", "redis"),
            redis_port,
            redis_password: secret("REDIS_PASSWORD"),
            executor_url: var_or("CRAWL_EXECUTOR_URL", "http://localhost:11235"),
            cache_ttl: Duration::from_secs(cache_ttl),
            openrouter_api_key: secret("OPENROUTER_API_KEY"),
            openrouter_model: var_or("OPENROUTER_MODEL", DEFAULT_MODEL),
            openrouter_base_url: var_or("OPENROUTER_BASE_URL", DEFAULT_COMPLETION_BASE_URL),
            compression_prompt: var_or("COMPRESSION_PROMPT", DEFAULT_COMPRESSION_PROMPT),
        })
    }

    /// Connection URL with the password percent-encoded.
    pub fn redis_url(&self) -> Result<String> {
        let invalid = |reason: String| AppError::ConfigError(format!("Invalid redis address: {}", reason));

        let mut url = Url::parse(&format!("redis://{}:{}", self.redis_host, self.redis_port))
            .map_err(|e| invalid(e.to_string()))?;
        if let Some(password) = &self.redis_password {
            url.set_password(Some(password))
                .map_err(|_| invalid("cannot carry a password".to_string()))?;
        }

        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_addr.port(), 8000);
        assert_eq!(config.redis_url().unwrap(), "redis://redis:6379");
        assert_eq!(config.cache_ttl, Duration::from_secs(86400));
        assert_eq!(config.openrouter_model, DEFAULT_MODEL);
        assert_eq!(config.compression_prompt, DEFAULT_COMPRESSION_PROMPT);
        assert!(config.openrouter_api_key.is_none());
    }

    #[test]
    fn redis_password_only_used_when_not_blank() {
        let config = config_from(&[("REDIS_PASSWORD", "   "), ("REDIS_HOST", "cache")]).unwrap();
        assert_eq!(config.redis_url().unwrap(), "redis://cache:6379");

        let config = config_from(&[("REDIS_PASSWORD", "s3cret"), ("REDIS_PORT", "6380")]).unwrap();
        assert_eq!(config.redis_url().unwrap(), "redis://:s3cret@redis:6380");
    }

    #[test]
    fn redis_password_is_percent_encoded() {
        let config = config_from(&[("REDIS_PASSWORD", "p@ss/w:rd")]).unwrap();
        let url = config.redis_url().unwrap();

        assert_eq!(url, "redis://:p%40ss%2Fw%3Ard@redis:6379");
        let client = redis::Client::open(url.as_str()).unwrap();
        assert_eq!(client.get_connection_info().redis.password.as_deref(), Some("p@ss/w:rd"));
    }

    #[test]
    fn zero_cache_ttl_is_rejected() {
        let err = config_from(&[("CACHE_TTL_SECONDS", "0")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let config = config_from(&[("CACHE_TTL_SECONDS", "60")]).unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn missing_api_key_is_not_a_startup_error() {
        let config = config_from(&[("OPENROUTER_API_KEY", "")]).unwrap();
        assert!(config.openrouter_api_key.is_none());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
