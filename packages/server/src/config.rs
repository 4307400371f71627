use common::config::{CleanupConfig, StorageAppConfig, UploadConfig};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Environment variable naming an alternative config file (without extension).
pub const CONFIG_PATH_ENV: &str = "SUBMISSIONS_CONFIG";

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one, records live in memory.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageAppConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/config".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .add_source(File::with_name(path).required(false))
            // e.g. SUBMISSIONS__AUTH__JWT_SECRET, SUBMISSIONS__STORAGE__BACKEND
            .add_source(
                Environment::with_prefix("SUBMISSIONS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_emails")
                    .with_list_parse_key("server.cors.allow_origins")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
