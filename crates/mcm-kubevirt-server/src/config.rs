use std::env;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Bearer token callers must present. `None` disables auth.
    pub api_token: Option<String>,
    /// Overrides the conflict retry budget of shutdown.
    pub shutdown_retry_attempts: Option<u32>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into());
        let listen_addr = listen_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "LISTEN_ADDR",
            expected: "a valid socket address",
            value: listen_addr.clone(),
        })?;

        let api_token = lookup("DRIVER_API_TOKEN").filter(|t| !t.is_empty());

        let shutdown_retry_attempts = match lookup("SHUTDOWN_RETRY_ATTEMPTS") {
            None => None,
            Some(raw) => Some(
                raw.parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::Invalid {
                        name: "SHUTDOWN_RETRY_ATTEMPTS",
                        expected: "a positive integer",
                        value: raw,
                    })?,
            ),
        };

        Ok(Self {
            listen_addr,
            api_token,
            shutdown_retry_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.api_token, None);
        assert_eq!(config.shutdown_retry_attempts, None);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("DRIVER_API_TOKEN", "s3cret"),
            ("SHUTDOWN_RETRY_ATTEMPTS", "6"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.api_token.as_deref(), Some("s3cret"));
        assert_eq!(config.shutdown_retry_attempts, Some(6));
    }

    #[test]
    fn empty_token_disables_auth() {
        let config = load(&[("DRIVER_API_TOKEN", "")]).unwrap();
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = load(&[("LISTEN_ADDR", "localhost")]).unwrap_err();
        assert!(err.to_string().contains("LISTEN_ADDR"));

        assert!(load(&[("SHUTDOWN_RETRY_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("SHUTDOWN_RETRY_ATTEMPTS", "many")]).is_err());
    }
}
