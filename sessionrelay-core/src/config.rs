use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("server.hostname must not be empty")]
    MissingHostname,

    #[error("upstream.origin must not be empty")]
    MissingOrigin,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// e.g. "0.0.0.0:9001"
    #[serde(default = "default_listen")]
    pub listen: String,

    /// The relay's own hostname as clients see it, e.g. "relay.example.com"
    /// or "localhost:9001". Drives the same-origin bypass and the canonical
    /// domain substituted into session entries.
    pub hostname: String,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL requests are forwarded to, e.g. "https://search.example.com".
    pub origin: String,

    /// Upstream call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

fn default_listen() -> String {
    "0.0.0.0:9001".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl RelayConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.into(),
            source,
        })?;
        let config: RelayConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.hostname.trim().is_empty() {
            return Err(ConfigError::MissingHostname);
        }
        if self.upstream.origin.trim().is_empty() {
            return Err(ConfigError::MissingOrigin);
        }
        Ok(())
    }

    /// Upstream origin with any trailing slash removed, so verbatim request
    /// paths concatenate cleanly.
    pub fn upstream_origin(&self) -> &str {
        self.upstream.origin.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_full_config() {
        let file = write_config(
            r#"
            [server]
            listen = "127.0.0.1:8080"
            hostname = "relay.example.com"

            [upstream]
            origin = "https://search.example.com"
            timeout_ms = 5000
            "#,
        );

        let config = RelayConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.server.hostname, "relay.example.com");
        assert_eq!(config.upstream.origin, "https://search.example.com");
        assert_eq!(config.upstream.timeout_ms, 5000);
    }

    #[test]
    fn listen_and_timeout_have_defaults() {
        let file = write_config(
            r#"
            [server]
            hostname = "relay.example.com"

            [upstream]
            origin = "https://search.example.com"
            "#,
        );

        let config = RelayConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:9001");
        assert_eq!(config.upstream.timeout_ms, 30_000);
    }

    #[test]
    fn empty_hostname_is_rejected() {
        let file = write_config(
            r#"
            [server]
            hostname = " "

            [upstream]
            origin = "https://search.example.com"
            "#,
        );

        let result = RelayConfig::from_file(file.path().to_str().unwrap());

        assert!(matches!(result, Err(ConfigError::MissingHostname)));
    }

    #[test]
    fn empty_origin_is_rejected() {
        let file = write_config(
            r#"
            [server]
            hostname = "relay.example.com"

            [upstream]
            origin = ""
            "#,
        );

        let result = RelayConfig::from_file(file.path().to_str().unwrap());

        assert!(matches!(result, Err(ConfigError::MissingOrigin)));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let file = write_config("not toml at all [");

        let result = RelayConfig::from_file(file.path().to_str().unwrap());

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = RelayConfig::from_file("/definitely/not/here.toml");

        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_origin() {
        let file = write_config(
            r#"
            [server]
            hostname = "relay.example.com"

            [upstream]
            origin = "https://search.example.com/"
            "#,
        );

        let config = RelayConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.upstream_origin(), "https://search.example.com");
    }
}
