// ⚙️ Configuration - TOML file first, environment variables on top
//
// The resulting `AppConfig` is passed explicitly into the analyzer and the
// server. Nothing reads the environment after startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::policy::RiskPolicy;

pub const CONFIG_PATH_ENV: &str = "RISK_ANALYTICS_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("risk_analytics.db"),
        }
    }
}

fn default_webhook_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// Sent as `X-Webhook-Secret` when present
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,

    /// No webhook section → no notification step
    pub webhook: Option<WebhookConfig>,

    pub policy: RiskPolicy,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
    }

    /// File (explicit path, else `RISK_ANALYTICS_CONFIG`, else defaults),
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);

        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => {
                let config = Self::from_file(&path)?;
                tracing::info!(path = %path.display(), "loaded config");
                config
            }
            None => {
                tracing::debug!("no config file given, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.policy.validate()?;
        Ok(config)
    }

    /// Apply `DATABASE_PATH`, `HOST`, `PORT`, `WEBHOOK_URL`, `WEBHOOK_SECRET`
    /// and `WEBHOOK_TIMEOUT_SECS` from the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }

        if let Some(url) = lookup("WEBHOOK_URL") {
            match self.webhook.as_mut() {
                Some(webhook) => webhook.url = url,
                None => {
                    self.webhook = Some(WebhookConfig {
                        url,
                        secret: None,
                        timeout_secs: default_webhook_timeout(),
                    })
                }
            }
        }
        if let Some(webhook) = self.webhook.as_mut() {
            if let Some(secret) = lookup("WEBHOOK_SECRET") {
                webhook.secret = Some(secret);
            }
            if let Some(timeout) = lookup("WEBHOOK_TIMEOUT_SECS") {
                webhook.timeout_secs = timeout
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid WEBHOOK_TIMEOUT_SECS: {}", timeout))?;
            }
        }

        Ok(())
    }
}
