use crate::errors::{CoqlError, CoqlResult};
use ::config::{Config, ConfigError, Environment, File, FileFormat, Source};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directory name under `~/.config`
pub const APP_NAME: &str = "coql-suite";

/// Prefix for layered environment overrides, e.g. `COQL_ZOHO__CLIENT_ID`
pub const ENV_PREFIX: &str = "COQL";

/// Unprefixed variables honoured for compatibility with existing `.env` files
const LEGACY_VARS: &[(&str, &str)] = &[
    ("GROQ_API_KEY", "llm.api_key"),
    ("ZOHO_CLIENT_ID", "zoho.client_id"),
    ("ZOHO_CLIENT_SECRET", "zoho.client_secret"),
    ("ZOHO_REFRESH_TOKEN", "zoho.refresh_token"),
    ("PORT", "server.port"),
];

const REDACTED: &str = "***";

/// Configuration shared by the server daemon and the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub zoho: ZohoConfig,
    pub cli: CliConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            log_level: None,
        }
    }
}

/// Chat-completion provider settings (OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model_name: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            api_key: None,
            base_url: "https://api.groq.com/openai".to_string(),
            model_name: "llama3-8b-8192".to_string(),
            timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZohoConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub api_base_url: String,
    pub accounts_url: String,
    pub timeout_secs: u64,
}

impl Default for ZohoConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            api_base_url: "https://www.zohoapis.in".to_string(),
            accounts_url: "https://accounts.zoho.in".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub server_url: String,
    pub log_level: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            log_level: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from defaults, the config file, legacy variables
    /// and `COQL_*` variables, in increasing order of precedence.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> CoqlResult<Self> {
        let (file, required) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (get_default_config_file(APP_NAME).ok(), false),
        };
        Self::load_layered(file.as_deref(), required, LegacyEnv::from_process(), None)
    }

    fn load_layered(
        file: Option<&Path>,
        file_required: bool,
        legacy: LegacyEnv,
        env_vars: Option<HashMap<String, String>>,
    ) -> CoqlResult<Self> {
        let mut builder = Config::builder();

        if let Some(file) = file {
            builder = builder.add_source(
                File::new(&file.to_string_lossy(), FileFormat::Toml).required(file_required),
            );
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env_vars.map(|vars| vars.into_iter().collect()));

        let config = builder
            .add_source(legacy)
            .add_source(environment)
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Copy with credentials masked, safe for printing
    pub fn redacted(&self) -> Self {
        let mask = |value: &Option<String>| value.as_ref().map(|_| REDACTED.to_string());
        let mut copy = self.clone();
        copy.llm.api_key = mask(&self.llm.api_key);
        copy.zoho.client_id = mask(&self.zoho.client_id);
        copy.zoho.client_secret = mask(&self.zoho.client_secret);
        copy.zoho.refresh_token = mask(&self.zoho.refresh_token);
        copy
    }

    pub fn to_toml_string(&self) -> CoqlResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CoqlError::ConfigError(format!("Failed to serialize config: {}", e)))
    }
}

/// Config source mapping the unprefixed legacy variables onto config keys
#[derive(Debug, Clone, Default)]
struct LegacyEnv {
    vars: HashMap<String, String>,
}

impl LegacyEnv {
    fn from_process() -> Self {
        let vars = LEGACY_VARS
            .iter()
            .filter_map(|(var, _)| std::env::var(var).ok().map(|v| (var.to_string(), v)))
            .collect();
        Self { vars }
    }
}

impl Source for LegacyEnv {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<::config::Map<String, ::config::Value>, ConfigError> {
        let origin = "legacy environment".to_string();
        let mut map = ::config::Map::new();
        for (var, key) in LEGACY_VARS {
            if let Some(value) = self.vars.get(*var).filter(|v| !v.is_empty()) {
                map.insert(
                    key.to_string(),
                    ::config::Value::new(Some(&origin), value.clone()),
                );
            }
        }
        Ok(map)
    }
}

/// Helper function to get default config directory
pub fn get_default_config_dir(app_name: &str) -> CoqlResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        CoqlError::ConfigError("Could not determine home directory".to_string())
    })?;

    Ok(home_dir.join(".config").join(app_name))
}

/// Helper function to get default config file path
pub fn get_default_config_file(app_name: &str) -> CoqlResult<PathBuf> {
    let config_dir = get_default_config_dir(app_name)?;
    Ok(config_dir.join("config.toml"))
}
