use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use sqlx::postgres::PgConnectOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    pub forecaster: ForecasterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port", deserialize_with = "deserialize_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    5
}

/// Custom deserializer that handles port as both number and string
///
/// Accepts:
/// - `port: 5432` (number)
/// - `port: "5432"` (string that parses to number)
/// - `port: ${DB_PORT}` (env var substituted to either)
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        String(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => Ok(n),
        PortValue::String(s) => s
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid port number: '{}'", s))),
    }
}

impl DatabaseConfig {
    /// Connection options built field by field, so credentials never pass
    /// through URL parsing
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port", deserialize_with = "deserialize_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_freshness_seconds")]
    pub freshness_seconds: u64,
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from("cache_predictions")
}

fn default_freshness_seconds() -> u64 {
    3600 // 1 hour
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            freshness_seconds: default_freshness_seconds(),
        }
    }
}

impl CacheConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    #[serde(default = "default_max_rows")]
    pub max_rows: u32,
    #[serde(default = "default_join_tolerance")]
    pub join_tolerance_seconds: u32,
}

/// One year of history is the most a single request may scan
pub const MAX_LOOKBACK_HOURS: u64 = 24 * 366;

fn default_lookback_hours() -> u64 {
    48
}

fn default_max_rows() -> u32 {
    100
}

fn default_join_tolerance() -> u32 {
    300
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            max_rows: default_max_rows(),
            join_tolerance_seconds: default_join_tolerance(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecasterConfig {
    /// Run a local program, feeding it JSON on stdin
    Process {
        #[serde(default = "default_command")]
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<PathBuf>,
        #[serde(default = "default_forecaster_timeout")]
        timeout_seconds: u64,
    },
    /// POST the input to a remote prediction service
    Http {
        url: String,
        #[serde(default = "default_forecaster_timeout")]
        timeout_seconds: u64,
    },
}

fn default_command() -> String {
    "python3".to_string()
}

fn default_forecaster_timeout() -> u64 {
    30
}

impl ForecasterConfig {
    pub fn timeout(&self) -> Duration {
        match self {
            ForecasterConfig::Process {
                timeout_seconds, ..
            }
            | ForecasterConfig::Http {
                timeout_seconds, ..
            } => Duration::from_secs(*timeout_seconds),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration text, substituting `${VAR}` references first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Unexpanded environment variables
    /// - Valid port ranges
    /// - Non-empty required fields
    /// - Positive windows and timeouts
    /// - Valid forecaster URL
    fn validate(&self) -> Result<()> {
        let fields_to_check = [
            ("DB_HOST", &self.database.host),
            ("DB_NAME", &self.database.name),
            ("DB_USER", &self.database.user),
            ("DB_PASSWORD", &self.database.password),
        ];

        for (field_name, value) in &fields_to_check {
            if value.contains("${") {
                return Err(AppError::Config(format!(
                    "{} environment variable is not set. \
                     Please set it or create a .env file. \
                     See .env.example for required variables.",
                    field_name
                )));
            }
        }

        if self.database.host.is_empty() {
            return Err(AppError::Config(
                "Database host cannot be empty".to_string(),
            ));
        }

        if self.database.name.is_empty() {
            return Err(AppError::Config(
                "Database name cannot be empty".to_string(),
            ));
        }

        if self.database.user.is_empty() {
            return Err(AppError::Config(
                "Database user cannot be empty".to_string(),
            ));
        }

        if self.database.port == 0 {
            return Err(AppError::Config("Database port cannot be 0".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::Config(
                "Database max_connections must be at least 1".to_string(),
            ));
        }

        if self.database.max_connections > 100 {
            return Err(AppError::Config(format!(
                "Database max_connections {} seems too high, maximum recommended is 100",
                self.database.max_connections
            )));
        }

        if self.database.acquire_timeout_seconds == 0 {
            return Err(AppError::Config(
                "Database acquire_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        if self.cache.directory.as_os_str().is_empty() {
            return Err(AppError::Config(
                "Cache directory cannot be empty".to_string(),
            ));
        }

        if self.cache.freshness_seconds == 0 {
            return Err(AppError::Config(
                "Cache freshness_seconds must be greater than 0".to_string(),
            ));
        }

        if self.history.lookback_hours == 0
            || self.history.max_rows == 0
            || self.history.join_tolerance_seconds == 0
        {
            return Err(AppError::Config(
                "History lookback_hours, max_rows and join_tolerance_seconds must be greater than 0"
                    .to_string(),
            ));
        }

        if self.history.lookback_hours > MAX_LOOKBACK_HOURS {
            return Err(AppError::Config(format!(
                "History lookback_hours {} is too large, maximum is {}",
                self.history.lookback_hours, MAX_LOOKBACK_HOURS
            )));
        }

        match &self.forecaster {
            ForecasterConfig::Process {
                command,
                timeout_seconds,
                ..
            } => {
                if command.trim().is_empty() {
                    return Err(AppError::Config(
                        "Forecaster command cannot be empty".to_string(),
                    ));
                }
                if *timeout_seconds == 0 {
                    return Err(AppError::Config(
                        "Forecaster timeout_seconds must be greater than 0".to_string(),
                    ));
                }
            }
            ForecasterConfig::Http {
                url,
                timeout_seconds,
            } => {
                let parsed = url::Url::parse(url).map_err(|e| {
                    AppError::Config(format!("Invalid forecaster url '{}': {}", url, e))
                })?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(AppError::Config(format!(
                        "Forecaster url must use http or https, got: {}",
                        parsed.scheme()
                    )));
                }
                if *timeout_seconds == 0 {
                    return Err(AppError::Config(
                        "Forecaster timeout_seconds must be greater than 0".to_string(),
                    ));
                }
            }
        }

        if self.forecaster.timeout().as_secs() > 600 {
            tracing::warn!(
                "Forecaster timeout of {}s is very long, requests will block for as long",
                self.forecaster.timeout().as_secs()
            );
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid substitution pattern: {}", e)))?;

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                if !missing_vars.iter().any(|v| v == var_name) {
                    missing_vars.push(var_name.to_string());
                }
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
