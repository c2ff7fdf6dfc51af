use std::path::Path;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use observer_engine::ObserverConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "observer", about = "Kafka message observation bridge")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge server, observation store and inspection API
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "observer.toml", env = "OBSERVER_CONFIG")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl HttpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    9210
}

impl ServerConfig {
    /// A missing file means defaults; an unreadable or invalid one is an error.
    pub fn load(path: &str) -> Result<Self, ServerError> {
        if !Path::new(path).exists() {
            tracing::info!(config = %path, "config not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        Self::parse(&content).map_err(|e| ServerError::Config {
            context: "parse",
            detail: format!("'{path}': {e}"),
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_sections_sit_at_the_top_level() {
        let config = ServerConfig::parse(
            r#"
            listen_published_messages = true

            [bridge]
            port = 50051

            [topic_suffixes]
            retry = ["-retry"]

            [http]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(config.observer.bridge.port, 50051);
        assert_eq!(config.observer.topic_suffixes.retry, vec!["-retry"]);
        assert!(config.observer.listen_published_messages);
        assert_eq!(config.http.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.http.port, 9210);
        assert_eq!(config.observer.bridge.port, 0);
        assert_eq!(config.observer.assertions.poll_interval_ms, 50);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = ServerConfig::load("/nonexistent/observer.toml").unwrap();
        assert_eq!(config.http.port, 9210);
    }
}
