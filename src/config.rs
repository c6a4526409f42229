use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    #[serde(default = "default_delivery_config")]
    pub delivery: DeliveryConfig,
    #[serde(default = "default_recipients_config")]
    pub recipients: RecipientsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Base URL of the WhatsApp gateway that owns the paired session.
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Six-field cron expression (with seconds) for connection-state polling.
    #[serde(default = "default_status_poll_cron")]
    pub status_poll_cron: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    #[serde(default = "default_test_message")]
    pub test_message: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecipientsConfig {
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    #[serde(default = "default_targets_key")]
    pub key: String,
}

impl DeliveryConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_status_poll_cron() -> String {
    "*/10 * * * * *".to_string()
}

fn default_send_delay_ms() -> u64 {
    500
}

fn default_test_message() -> String {
    "Test message from Salto-WhatsApp Bridge".to_string()
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_targets_key() -> String {
    "WHATSAPP_TARGETS".to_string()
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
        port: default_port(),
    }
}

fn default_delivery_config() -> DeliveryConfig {
    DeliveryConfig {
        send_delay_ms: default_send_delay_ms(),
        test_message: default_test_message(),
    }
}

fn default_recipients_config() -> RecipientsConfig {
    RecipientsConfig {
        env_file: default_env_file(),
        key: default_targets_key(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
[gateway]
base_url = "http://localhost:8080"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.gateway.api_key, None);
        assert_eq!(config.delivery.send_delay(), Duration::from_millis(500));
        assert_eq!(config.recipients.key, "WHATSAPP_TARGETS");
        assert_eq!(config.recipients.env_file, PathBuf::from(".env"));
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
[server]
bind = "127.0.0.1"
port = 8123

[gateway]
base_url = "http://gw:9000"
api_key = "secret"
status_poll_cron = "*/30 * * * * *"

[delivery]
send_delay_ms = 0
test_message = "ping"

[recipients]
env_file = "/etc/salto/.env"
key = "TARGETS"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.gateway.api_key.as_deref(), Some("secret"));
        assert_eq!(config.gateway.status_poll_cron, "*/30 * * * * *");
        assert_eq!(config.delivery.send_delay(), Duration::ZERO);
        assert_eq!(config.delivery.test_message, "ping");
        assert_eq!(config.recipients.key, "TARGETS");
    }

    #[test]
    fn test_missing_gateway_is_an_error() {
        let err = Config::parse("[server]\nport = 1\n").unwrap_err();
        assert!(format!("{:#}", err).contains("gateway"));
    }
}
