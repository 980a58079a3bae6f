//! Unified configuration loading for keel services.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

use crate::docs::DocumentConfig;
use crate::error::AppError;
use crate::openapi::{Info, Server};
use crate::Result;

/// Loader for service configuration.
///
/// Automatically loads configuration from:
/// 1. `config/default.toml`
/// 2. `config/{env}.toml` (where {env} is RUN_MODE, defaults to "development")
/// 3. `config/local.toml`
/// 4. Environment variables (nested keys separated by `__`, e.g. `SERVER__PORT`)
/// 5. `.env` file
pub struct KeelConfig;

impl KeelConfig {
    /// Load configuration into a struct that implements `Deserialize`.
    pub fn load<T>() -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        info!("Loading configuration for environment: {}", run_mode);

        let settings = Config::builder()
            .add_source(File::new("config/default", FileFormat::Toml).required(false))
            .add_source(
                File::new(&format!("config/{}", run_mode), FileFormat::Toml).required(false),
            )
            // Local overrides (gitignored)
            .add_source(File::new("config/local", FileFormat::Toml).required(false))
            .add_source(Environment::default().separator("__"))
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))
    }
}

/// Typed configuration of the service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub docs: DocsConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Reject settings that would only fail later, at bind or docs time.
    pub fn validate(&self) -> Result<()> {
        if !self.api.prefix.is_empty() && !self.api.prefix.starts_with('/') {
            return Err(AppError::Config(format!(
                "api.prefix must start with `/`, got `{}`",
                self.api.prefix
            )));
        }
        for path in [&self.docs.json_path, &self.docs.ui_path] {
            if !path.starts_with('/') {
                return Err(AppError::Config(format!(
                    "docs paths must start with `/`, got `{path}`"
                )));
            }
        }
        for server in &self.docs.servers {
            // Relative server URLs are allowed by OpenAPI.
            if !server.url.starts_with('/') {
                url::Url::parse(&server.url).map_err(|e| {
                    AppError::Config(format!("invalid server url `{}`: {e}", server.url))
                })?;
            }
        }
        Ok(())
    }

    /// Document settings derived from `docs` and `api`.
    pub fn document(&self) -> DocumentConfig {
        DocumentConfig {
            info: Info {
                title: self.docs.title.clone(),
                version: self.docs.version.clone(),
                description: self.docs.description.clone(),
            },
            servers: self
                .docs
                .servers
                .iter()
                .map(|server| Server {
                    url: server.url.clone(),
                    description: server.description.clone(),
                })
                .collect(),
            global_prefix: self.api.prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Global prefix for every controller, e.g. `/api`.
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub servers: Vec<ServerEntry>,
    /// Where the OpenAPI JSON is served.
    pub json_path: String,
    /// Where the interactive UI is served.
    pub ui_path: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            title: "Keel API".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some("User management REST API".to_string()),
            servers: vec![ServerEntry {
                url: "http://localhost:3000".to_string(),
                description: Some("Local development".to_string()),
            }],
            json_path: "/api-docs/openapi.json".to_string(),
            ui_path: "/scalar".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
