use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{TimeRange, parse_timestamp};
use crate::error::StrikeError;

pub const DEFAULT_CONFIG_FILE: &str = "thunderstruck.json";
pub const USERNAME_ENV: &str = "THUNDERSTRUCK_USERNAME";
pub const PASSWORD_ENV: &str = "THUNDERSTRUCK_PASSWORD";

const DEFAULT_STEP_MINUTES: u32 = 10;
const DEFAULT_DOWNLOAD_WORKERS: usize = 8;
const DEFAULT_PARSE_WORKERS: usize = 4;
const DEFAULT_FALLBACK_COOLDOWN_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_OUTPUT: &str = "strikes.geojson.gz";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub base_url: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub step_minutes: Option<u32>,
    #[serde(default)]
    pub download_workers: Option<usize>,
    #[serde(default)]
    pub parse_workers: Option<usize>,
    #[serde(default)]
    pub fallback_cooldown_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Command-line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub start: Option<String>,
    pub end: Option<String>,
    pub output: Option<String>,
    pub cache_dir: Option<String>,
    pub download_workers: Option<usize>,
    pub parse_workers: Option<usize>,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub range: TimeRange,
    pub download_workers: usize,
    pub parse_workers: usize,
    pub fallback_cooldown: Duration,
    pub request_timeout: Duration,
    pub cache_dir: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub credentials: Option<Credentials>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, StrikeError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(StrikeError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| StrikeError::ConfigRead(config_path.clone()))?;
        let mut config: Config = serde_json::from_str(&content)
            .map_err(|err| StrikeError::ConfigParse(err.to_string()))?;

        apply_env_credentials(&mut config);
        config.apply(overrides);
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, StrikeError> {
        let base_url = config.base_url.trim().to_string();
        if base_url.is_empty() {
            return Err(StrikeError::ConfigParse("base_url must not be empty".to_string()));
        }

        let start = parse_timestamp(&config.start)?;
        let end = parse_timestamp(&config.end)?;
        let range = TimeRange::with_step_minutes(
            start,
            end,
            config.step_minutes.unwrap_or(DEFAULT_STEP_MINUTES),
        )?
        .aligned()?;

        let cache_dir = match config.cache_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_cache_dir()?,
        };
        let output = Utf8PathBuf::from(config.output.unwrap_or_else(|| DEFAULT_OUTPUT.to_string()));

        let credentials = config
            .username
            .filter(|name| !name.trim().is_empty())
            .map(|username| Credentials {
                username,
                password: config.password,
            });

        Ok(ResolvedConfig {
            base_url,
            range,
            download_workers: config
                .download_workers
                .unwrap_or(DEFAULT_DOWNLOAD_WORKERS)
                .max(1),
            parse_workers: config.parse_workers.unwrap_or(DEFAULT_PARSE_WORKERS).max(1),
            fallback_cooldown: Duration::from_secs(
                config
                    .fallback_cooldown_secs
                    .unwrap_or(DEFAULT_FALLBACK_COOLDOWN_SECS),
            ),
            request_timeout: Duration::from_secs(
                config
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            cache_dir,
            output,
            credentials,
        })
    }
}

impl Config {
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(start) = &overrides.start {
            self.start = start.clone();
        }
        if let Some(end) = &overrides.end {
            self.end = end.clone();
        }
        if let Some(output) = &overrides.output {
            self.output = Some(output.clone());
        }
        if let Some(cache_dir) = &overrides.cache_dir {
            self.cache_dir = Some(cache_dir.clone());
        }
        if let Some(workers) = overrides.download_workers {
            self.download_workers = Some(workers);
        }
        if let Some(workers) = overrides.parse_workers {
            self.parse_workers = Some(workers);
        }
    }
}

fn apply_env_credentials(config: &mut Config) {
    if let Ok(username) = std::env::var(USERNAME_ENV) {
        if !username.trim().is_empty() {
            config.username = Some(username.trim().to_string());
        }
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            config.password = Some(password);
        }
    }
}

pub fn default_cache_dir() -> Result<Utf8PathBuf, StrikeError> {
    ProjectDirs::from("", "", "thunderstruck")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.cache_dir().join("slices")).ok())
        .ok_or_else(|| StrikeError::Filesystem("unable to resolve cache directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = Config {
            base_url: "https://archive.example.com/strikes".to_string(),
            start: "2015-08-01T00:00".to_string(),
            end: "2015-08-01T01:00".to_string(),
            cache_dir: Some("/tmp/thunderstruck".to_string()),
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.range.slices().count(), 7);
        assert_eq!(resolved.download_workers, DEFAULT_DOWNLOAD_WORKERS);
        assert_eq!(resolved.parse_workers, DEFAULT_PARSE_WORKERS);
        assert_eq!(resolved.fallback_cooldown, Duration::from_secs(5));
        assert_eq!(resolved.output, Utf8PathBuf::from(DEFAULT_OUTPUT));
        assert!(resolved.credentials.is_none());
    }

    #[test]
    fn start_off_the_grid_is_rounded_down() {
        let config = Config {
            base_url: "https://archive.example.com/strikes".to_string(),
            start: "2015-08-01T04:05".to_string(),
            end: "2015-08-01T04:20".to_string(),
            cache_dir: Some("/tmp/thunderstruck".to_string()),
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        let urls = resolved
            .range
            .slices()
            .map(|slice| slice.resource_url(&resolved.base_url, false))
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "https://archive.example.com/strikes/2015/08/01/04/00.json",
                "https://archive.example.com/strikes/2015/08/01/04/10.json",
                "https://archive.example.com/strikes/2015/08/01/04/20.json",
            ]
        );
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials {
            username: "observer".to_string(),
            password: Some("hunter2".to_string()),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("observer"));
        assert!(!rendered.contains("hunter2"));
    }
}
