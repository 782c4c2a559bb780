use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".gatorconfig.json";

const DEFAULT_DATABASE_URL: &str = "sqlite://gator.db?mode=rwc";
const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no config file location: set HOME or GATOR_CONFIG")]
    NoConfigPath,
    #[error("invalid duration {value:?} for {key}")]
    InvalidDuration { key: String, value: String },
}

/// On-disk shape of `~/.gatorconfig.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    db_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub current_user_name: Option<String>,
    pub fetch_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            current_user_name: None,
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl Config {
    /// Defaults, then the JSON config file, then `.env` and process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_from(config_path().as_deref(), |key| std::env::var(key).ok())
    }

    pub fn load_from(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(file) = path.map(read_file_config).transpose()?.flatten() {
            if let Some(db_url) = file.db_url.filter(|value| !value.trim().is_empty()) {
                config.database_url = db_url;
            }
            config.current_user_name = file.current_user_name;
        }

        if let Some(db_url) = env("GATOR_DB_URL").filter(|value| !value.trim().is_empty()) {
            config.database_url = db_url;
        }
        if let Some(interval) = duration_from_env(&env, "GATOR_FETCH_INTERVAL")? {
            config.fetch_interval = interval;
        }
        if let Some(timeout) = duration_from_env(&env, "GATOR_FETCH_TIMEOUT")? {
            config.fetch_timeout = timeout;
        }

        Ok(config)
    }
}

/// `GATOR_CONFIG` when set, otherwise `~/.gatorconfig.json`.
pub fn config_path() -> Option<PathBuf> {
    std::env::var_os("GATOR_CONFIG")
        .map(PathBuf::from)
        .or_else(default_config_path)
}

/// Records `name` as the current user in the config file at `path`, keeping
/// the file's other keys. The file is created when missing.
pub fn save_current_user(path: &Path, name: &str) -> Result<(), ConfigError> {
    let mut file = read_file_config(path)?.unwrap_or_default();
    file.current_user_name = Some(name.to_string());
    let raw = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, raw).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses Go-style durations such as `30s`, `1m`, `1h30m` or `1.5h`.
/// Zero and unit-less values are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        let value: f64 = number.parse().ok()?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let unit_nanos = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };

        let nanos = (value * unit_nanos).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return None;
        }
        total = total.checked_add(Duration::from_nanos(nanos as u64))?;
        rest = tail;
    }

    (!total.is_zero()).then_some(total)
}

fn duration_from_env(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = env(key) else {
        return Ok(None);
    };
    parse_duration(&value)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidDuration {
            key: key.to_string(),
            value,
        })
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
}

fn read_file_config(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
