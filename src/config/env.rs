use alloy_primitives::{Address, U256};
use config::{Config as ConfigLoader, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;
use crate::presale::{DEFAULT_EVENT_CAPACITY, NATIVE_UNIT};

/// Environment variable prefixes for different configuration sections
const ENV_PREFIX: &str = "IDO";
const ENV_MANAGER_PREFIX: &str = "IDO_MANAGER";
const ENV_LOG_PREFIX: &str = "IDO_LOG";

/// Fallback exchange rate: 100 sale tokens (18 decimals) per native unit
const FALLBACK_EXCHANGE_RATE: u64 = 100;
/// Fallback hard cap: 5 native units
const FALLBACK_HARD_CAP: u64 = 5;

/// Sale manager configuration loaded from environment/files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerEnvConfig {
    /// Manager owner address (hex)
    pub owner: Option<String>,
    /// Capacity of the presale event channel
    pub event_capacity: Option<usize>,
    /// Default exchange rate for new sales, in token base units per native unit
    pub default_exchange_rate: Option<String>,
    /// Default hard cap for new sales, in native base units
    pub default_hard_cap: Option<String>,
}

/// Logging configuration from environment/files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingEnvConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: Option<String>,
    /// Log format (compact, pretty, json)
    pub format: Option<String>,
    /// Enable colored output
    pub enable_colors: Option<bool>,
    /// Log file path (optional)
    pub file_path: Option<String>,
    /// Enable structured logging
    pub structured: Option<bool>,
}

/// Complete environment configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Sale manager configuration
    pub manager: ManagerEnvConfig,
    /// Logging configuration
    pub logging: LoggingEnvConfig,
    /// Custom environment variables
    pub custom: HashMap<String, String>,
    /// Configuration file paths that were loaded
    #[serde(skip)]
    pub loaded_files: Vec<String>,
}

impl EnvironmentConfig {
    /// Load configuration from environment variables and files
    pub fn load() -> Result<Self, Error> {
        let mut env_config = Self::default();

        // Environment variables take precedence over files
        env_config.load_from_env()?;
        env_config.load_from_files()?;

        env_config.validate()?;

        Ok(env_config)
    }

    /// Load configuration from a single file, then apply environment overrides
    pub fn load_from_path(file_path: &Path) -> Result<Self, Error> {
        let mut env_config = Self::default();
        env_config.load_from_env()?;
        env_config.load_config_file(file_path)?;
        env_config
            .loaded_files
            .push(file_path.to_string_lossy().to_string());
        env_config.validate()?;
        Ok(env_config)
    }

    /// Load configuration from files
    fn load_from_files(&mut self) -> Result<(), Error> {
        let config_dir = env::var("IDO_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        // Configuration file names to try (in order of preference)
        let config_files = ["ido.toml", "ido.json", "config.toml", "config.json"];

        // Paths to search for configuration files
        let search_paths = [
            config_dir,
            "config".to_string(),
            "../config".to_string(),
            ".".to_string(),
        ];

        for search_path in &search_paths {
            for config_file in &config_files {
                let file_path = Path::new(search_path).join(config_file);
                let display = file_path.to_string_lossy().to_string();
                if file_path.exists() && !self.loaded_files.contains(&display) {
                    self.load_config_file(&file_path)?;
                    self.loaded_files.push(display);
                }
            }
        }

        Ok(())
    }

    /// Load a specific configuration file
    fn load_config_file(&mut self, file_path: &Path) -> Result<(), Error> {
        let file_format = match file_path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        };

        let settings = ConfigLoader::builder()
            .add_source(File::from(file_path).format(file_format))
            .build()
            .map_err(|e| Error::Config(format!("Failed to load config file: {}", e)))?;

        if let Ok(manager_config) = settings.get::<ManagerEnvConfig>("manager") {
            self.merge_manager_config(manager_config);
        }

        if let Ok(logging_config) = settings.get::<LoggingEnvConfig>("logging") {
            self.merge_logging_config(logging_config);
        }

        if let Ok(custom_map) = settings.get::<HashMap<String, String>>("custom") {
            for (key, value) in custom_map {
                self.custom.entry(key).or_insert(value);
            }
        }

        Ok(())
    }

    /// Load configuration from environment variables
    fn load_from_env(&mut self) -> Result<(), Error> {
        self.load_manager_env()?;
        self.load_logging_env()?;
        self.load_custom_env()?;
        Ok(())
    }

    fn load_manager_env(&mut self) -> Result<(), Error> {
        if let Ok(owner) = env::var(format!("{}_OWNER", ENV_MANAGER_PREFIX)) {
            self.manager.owner = Some(owner);
        }

        if let Ok(capacity_str) = env::var(format!("{}_EVENT_CAPACITY", ENV_MANAGER_PREFIX)) {
            if let Ok(capacity) = capacity_str.parse::<usize>() {
                self.manager.event_capacity = Some(capacity);
            }
        }

        if let Ok(rate) = env::var(format!("{}_DEFAULT_EXCHANGE_RATE", ENV_MANAGER_PREFIX)) {
            self.manager.default_exchange_rate = Some(rate);
        }

        if let Ok(cap) = env::var(format!("{}_DEFAULT_HARD_CAP", ENV_MANAGER_PREFIX)) {
            self.manager.default_hard_cap = Some(cap);
        }

        Ok(())
    }

    fn load_logging_env(&mut self) -> Result<(), Error> {
        if let Ok(level) = env::var(format!("{}_LEVEL", ENV_LOG_PREFIX)) {
            self.logging.level = Some(level);
        }

        if let Ok(format) = env::var(format!("{}_FORMAT", ENV_LOG_PREFIX)) {
            self.logging.format = Some(format);
        }

        if let Ok(colors_str) = env::var(format!("{}_ENABLE_COLORS", ENV_LOG_PREFIX)) {
            if let Ok(colors) = colors_str.parse::<bool>() {
                self.logging.enable_colors = Some(colors);
            }
        }

        if let Ok(file_path) = env::var(format!("{}_FILE_PATH", ENV_LOG_PREFIX)) {
            self.logging.file_path = Some(file_path);
        }

        if let Ok(structured_str) = env::var(format!("{}_STRUCTURED", ENV_LOG_PREFIX)) {
            if let Ok(structured) = structured_str.parse::<bool>() {
                self.logging.structured = Some(structured);
            }
        }

        Ok(())
    }

    /// Load custom environment variables with the IDO prefix
    fn load_custom_env(&mut self) -> Result<(), Error> {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX)
                && !key.starts_with(ENV_MANAGER_PREFIX)
                && !key.starts_with(ENV_LOG_PREFIX)
                && key != "IDO_CONFIG_DIR"
            {
                self.custom.insert(key, value);
            }
        }

        Ok(())
    }

    /// Merge manager configuration (values already set win)
    fn merge_manager_config(&mut self, file_config: ManagerEnvConfig) {
        if self.manager.owner.is_none() {
            self.manager.owner = file_config.owner;
        }
        if self.manager.event_capacity.is_none() {
            self.manager.event_capacity = file_config.event_capacity;
        }
        if self.manager.default_exchange_rate.is_none() {
            self.manager.default_exchange_rate = file_config.default_exchange_rate;
        }
        if self.manager.default_hard_cap.is_none() {
            self.manager.default_hard_cap = file_config.default_hard_cap;
        }
    }

    /// Merge logging configuration (values already set win)
    fn merge_logging_config(&mut self, file_config: LoggingEnvConfig) {
        if self.logging.level.is_none() {
            self.logging.level = file_config.level;
        }
        if self.logging.format.is_none() {
            self.logging.format = file_config.format;
        }
        if self.logging.enable_colors.is_none() {
            self.logging.enable_colors = file_config.enable_colors;
        }
        if self.logging.file_path.is_none() {
            self.logging.file_path = file_config.file_path;
        }
        if self.logging.structured.is_none() {
            self.logging.structured = file_config.structured;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(owner) = self.get_owner()? {
            if owner == Address::ZERO {
                return Err(Error::Config("Manager owner must not be the zero address".to_string()));
            }
        }

        if let Some(capacity) = self.manager.event_capacity {
            if capacity == 0 {
                return Err(Error::Config(
                    "Event capacity must be greater than 0".to_string(),
                ));
            }
        }

        if self.get_default_exchange_rate()?.is_zero() {
            return Err(Error::Config(
                "Default exchange rate must be greater than 0".to_string(),
            ));
        }

        if self.get_default_hard_cap()?.is_zero() {
            return Err(Error::Config(
                "Default hard cap must be greater than 0".to_string(),
            ));
        }

        if let Some(ref level) = self.logging.level {
            let valid_levels = ["error", "warn", "info", "debug", "trace"];
            if !valid_levels.contains(&level.as_str()) {
                return Err(Error::Config(format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    level, valid_levels
                )));
            }
        }

        if let Some(ref format) = self.logging.format {
            let valid_formats = ["compact", "pretty", "json"];
            if !valid_formats.contains(&format.as_str()) {
                return Err(Error::Config(format!(
                    "Invalid log format '{}'. Must be one of: {:?}",
                    format, valid_formats
                )));
            }
        }

        Ok(())
    }

    /// Generate default configuration file
    pub fn generate_default_config() -> Self {
        let mut config = Self::default();

        config.manager.event_capacity = Some(DEFAULT_EVENT_CAPACITY);
        config.manager.default_exchange_rate =
            Some((U256::from(FALLBACK_EXCHANGE_RATE) * NATIVE_UNIT).to_string());
        config.manager.default_hard_cap =
            Some((U256::from(FALLBACK_HARD_CAP) * NATIVE_UNIT).to_string());

        config.logging.level = Some("info".to_string());
        config.logging.format = Some("compact".to_string());
        config.logging.enable_colors = Some(true);
        config.logging.structured = Some(false);

        config
    }

    /// Save configuration to file
    pub fn save_to_file(&self, file_path: &Path) -> Result<(), Error> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(file_path, content)?;
        Ok(())
    }

    pub fn get_custom(&self, key: &str) -> Option<&String> {
        self.custom.get(key)
    }

    pub fn set_custom(&mut self, key: String, value: String) {
        self.custom.insert(key, value);
    }

    /// Configured manager owner, if any
    pub fn get_owner(&self) -> Result<Option<Address>, Error> {
        self.manager
            .owner
            .as_deref()
            .map(|owner| {
                Address::from_str(owner)
                    .map_err(|e| Error::Config(format!("Invalid owner address '{}': {}", owner, e)))
            })
            .transpose()
    }

    pub fn get_event_capacity(&self) -> usize {
        self.manager.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY)
    }

    pub fn get_default_exchange_rate(&self) -> Result<U256, Error> {
        parse_amount(
            self.manager.default_exchange_rate.as_deref(),
            U256::from(FALLBACK_EXCHANGE_RATE) * NATIVE_UNIT,
        )
    }

    pub fn get_default_hard_cap(&self) -> Result<U256, Error> {
        parse_amount(
            self.manager.default_hard_cap.as_deref(),
            U256::from(FALLBACK_HARD_CAP) * NATIVE_UNIT,
        )
    }

    pub fn get_log_level(&self) -> String {
        self.logging
            .level
            .clone()
            .unwrap_or_else(|| "info".to_string())
    }

    pub fn get_log_format(&self) -> String {
        self.logging
            .format
            .clone()
            .unwrap_or_else(|| "compact".to_string())
    }
}

fn parse_amount(value: Option<&str>, fallback: U256) -> Result<U256, Error> {
    match value {
        Some(raw) => U256::from_str(raw.trim())
            .map_err(|e| Error::Config(format!("Invalid amount '{}': {}", raw, e))),
        None => Ok(fallback),
    }
}
