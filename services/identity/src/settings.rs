//! Service settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file (`identity.toml`, or the path in `IDENTITY_CONFIG`), then
//! `IDENTITY__SECTION__KEY` environment variables. Database connection
//! settings stay on the shared `DATABASE_*` variables read by
//! [`common::database::DatabaseConfig`].

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;

pub const CONFIG_PATH_VAR: &str = "IDENTITY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "identity.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub seed: SeedSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// Report disabled accounts with the bad-credentials message.
    pub uniform_login_errors: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedSettings {
    pub enabled: bool,
    pub email_domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Settings {
    /// Load from the file named by `IDENTITY_CONFIG` (or the default path)
    /// and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(&path)
    }

    /// Load using `path` as the optional file layer.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("storage.backend", "postgres")?
            .set_default("auth.uniform_login_errors", false)?
            .set_default("seed.enabled", false)?
            .set_default("seed.email_domain", "example.com")?
            .set_default("log.level", "info")?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("IDENTITY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 4] = [
        "IDENTITY__SERVER__PORT",
        "IDENTITY__STORAGE__BACKEND",
        "IDENTITY__AUTH__UNIFORM_LOGIN_ERRORS",
        "IDENTITY__SEED__EMAIL_DOMAIN",
    ];

    fn clear_env() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
        }
    }

    fn missing_file() -> String {
        env::temp_dir()
            .join("identity-settings-absent.toml")
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    #[serial]
    fn defaults_apply_without_file_or_env() {
        clear_env();
        let settings = Settings::from_file(&missing_file()).unwrap();

        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.storage.backend, StorageBackend::Postgres);
        assert!(!settings.auth.uniform_login_errors);
        assert!(!settings.seed.enabled);
        assert_eq!(settings.seed.email_domain, "example.com");
        assert_eq!(settings.log.level, "info");
        assert!(settings.server.addr().is_ok());
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        clear_env();
        unsafe {
            env::set_var("IDENTITY__SERVER__PORT", "9100");
            env::set_var("IDENTITY__STORAGE__BACKEND", "memory");
            env::set_var("IDENTITY__AUTH__UNIFORM_LOGIN_ERRORS", "true");
        }

        let settings = Settings::from_file(&missing_file()).unwrap();
        clear_env();

        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert!(settings.auth.uniform_login_errors);
    }

    #[test]
    #[serial]
    fn file_layer_sits_between_defaults_and_env() {
        clear_env();
        let path = env::temp_dir().join("identity-settings-layer.toml");
        std::fs::write(
            &path,
            "[seed]\nenabled = true\nemail_domain = \"corp.test\"\n\n[server]\nport = 7000\n",
        )
        .unwrap();
        unsafe {
            env::set_var("IDENTITY__SERVER__PORT", "7001");
        }

        let settings = Settings::from_file(&path.to_string_lossy()).unwrap();
        clear_env();
        let _ = std::fs::remove_file(&path);

        assert!(settings.seed.enabled);
        assert_eq!(settings.seed.email_domain, "corp.test");
        assert_eq!(settings.server.port, 7001);
    }

    #[test]
    #[serial]
    fn unknown_backend_is_rejected() {
        clear_env();
        unsafe {
            env::set_var("IDENTITY__STORAGE__BACKEND", "sqlite");
        }
        let result = Settings::from_file(&missing_file());
        clear_env();
        assert!(result.is_err());
    }
}
