//! Global configuration parsing, validation, and environment overrides.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// How MCP modules are launched.
///
/// A module `m` is started as `command args… m`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Launcher binary.
    #[serde(default = "default_runner_command")]
    pub command: String,
    /// Arguments placed before the module identifier.
    #[serde(default = "default_runner_args")]
    pub args: Vec<String>,
    /// Session timeout used when a call does not name one; 0 disables it.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Log every wire line at debug level.
    #[serde(default)]
    pub debug_wire: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_runner_command(),
            args: default_runner_args(),
            default_timeout_ms: default_timeout_ms(),
            debug_wire: false,
        }
    }
}

/// Where provider tokens come from.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CredentialConfig {
    /// `SQLite` connection store; no store when absent.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Consult the OS keychain before the process environment.
    #[serde(default = "default_true")]
    pub use_keychain: bool,
    /// Keychain service name; entries are keyed by environment variable name.
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            use_keychain: true,
            keychain_service: default_keychain_service(),
        }
    }
}

/// A credential domain bound to one MCP module.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Module identifier passed to the runner.
    pub module: String,
    /// HTTP action name to tool name.
    pub tools: BTreeMap<String, String>,
    /// Token fields that must resolve before the module is spawned.
    #[serde(default)]
    pub required: Vec<String>,
    /// Token field to the environment variable it is exported as.
    #[serde(default)]
    pub env_map: BTreeMap<String, String>,
    /// Export the stored `access_token` as `ACCESS_TOKEN`.
    #[serde(default)]
    pub pass_access_token: bool,
    /// Per-provider timeout; falls back to the runner default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ProviderConfig {
    /// Tool mapped to `action`, if any.
    #[must_use]
    pub fn tool_for(&self, action: &str) -> Option<&str> {
        self.tools.get(action).map(String::as_str)
    }
}

fn default_true() -> bool {
    true
}

fn default_http_port() -> u16 {
    3000
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_runner_command() -> String {
    "npx".into()
}

fn default_runner_args() -> Vec<String> {
    vec!["-y".into()]
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_keychain_service() -> String {
    "mcp-bridge".into()
}

/// Providers available without any configuration.
#[must_use]
pub fn builtin_providers() -> BTreeMap<String, ProviderConfig> {
    let pairs = |items: &[(&str, &str)]| -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    };

    let gmail = ProviderConfig {
        module: "@gongrzhe/server-gmail-autoauth-mcp".into(),
        tools: pairs(&[("read", "readEmails"), ("send", "sendEmail")]),
        required: vec![
            "refresh_token".into(),
            "client_id".into(),
            "client_secret".into(),
        ],
        env_map: pairs(&[
            ("refresh_token", "GOOGLE_REFRESH_TOKEN"),
            ("client_id", "GOOGLE_CLIENT_ID"),
            ("client_secret", "GOOGLE_CLIENT_SECRET"),
        ]),
        pass_access_token: true,
        timeout_ms: None,
    };

    let brave = ProviderConfig {
        module: "@modelcontextprotocol/server-brave-search".into(),
        tools: pairs(&[("search", "brave_web_search")]),
        required: vec!["api_key".into()],
        env_map: pairs(&[("api_key", "BRAVE_API_KEY")]),
        pass_access_token: false,
        timeout_ms: None,
    };

    BTreeMap::from([("gmail".to_owned(), gmail), ("brave".to_owned(), brave)])
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP listen port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// HTTP listen address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Module launcher settings.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Credential sources.
    #[serde(default)]
    pub credentials: CredentialConfig,
    /// Merge the built-in `gmail` and `brave` providers under file entries.
    #[serde(default = "default_true")]
    pub include_builtin_providers: bool,
    /// Providers by name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            host: default_host(),
            runner: RunnerConfig::default(),
            credentials: CredentialConfig::default(),
            include_builtin_providers: true,
            providers: builtin_providers(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, merge built-in providers and
    /// validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        if config.include_builtin_providers {
            for (name, provider) in builtin_providers() {
                config.providers.entry(name).or_insert(provider);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply `PORT` and `DEBUG_MCP` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `PORT` is not a valid port number.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides using `lookup` as the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `PORT` is not a valid port number.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
            self.http_port = port
                .trim()
                .parse()
                .map_err(|err| AppError::Config(format!("PORT '{port}' is invalid: {err}")))?;
        }

        if let Some(flag) = lookup("DEBUG_MCP") {
            self.runner.debug_wire = debug_flag_enabled(&flag);
        }

        Ok(())
    }

    /// Provider registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown providers.
    pub fn provider(&self, name: &str) -> Result<&ProviderConfig> {
        self.providers
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("unknown provider '{name}'")))
    }

    /// `host:port` the HTTP server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    fn validate(&self) -> Result<()> {
        if self.runner.command.trim().is_empty() {
            return Err(AppError::Config("runner.command must not be empty".into()));
        }

        if self.credentials.keychain_service.trim().is_empty() {
            return Err(AppError::Config(
                "credentials.keychain_service must not be empty".into(),
            ));
        }

        for (name, provider) in &self.providers {
            if name.is_empty() || name.contains('/') {
                return Err(AppError::Config(format!("invalid provider name '{name}'")));
            }
            if provider.module.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "provider '{name}' has an empty module"
                )));
            }
            if provider.tools.is_empty() {
                return Err(AppError::Config(format!(
                    "provider '{name}' must map at least one action"
                )));
            }
            if let Some((action, _)) = provider.tools.iter().find(|(_, tool)| tool.is_empty()) {
                return Err(AppError::Config(format!(
                    "provider '{name}' action '{action}' has an empty tool name"
                )));
            }
            for field in &provider.required {
                let mapped = provider.env_map.contains_key(field);
                let stored = matches!(
                    field.as_str(),
                    "access_token" | "refresh_token" | "expires_at"
                );
                if !mapped && !stored {
                    warn!(
                        provider = name.as_str(),
                        field = field.as_str(),
                        "required field has no env mapping and is not a stored column"
                    );
                }
            }
        }

        Ok(())
    }
}

/// `DEBUG_MCP` accepts `1` or `true` (any case).
#[must_use]
pub fn debug_flag_enabled(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}
