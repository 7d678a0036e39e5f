use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use flight_motion::RegistryOptions;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::debug;

use crate::error::{ApplicationError, ApplicationResult};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

pub(crate) fn flight_tracker_project_dir() -> ApplicationResult<ProjectDirs> {
    ProjectDirs::from("", "meltinglava", "flight_tracker")
        .ok_or(ApplicationError::NoProjectDirectory)
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TrackerConfig {
    pub endpoint: String,
    pub status_filter: Option<String>,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub animation_duration_ms: u64,
    pub frame_interval_ms: u64,
    pub stale_after_polls: u32,
    pub recent_path_limit: usize,
    pub geojson_output: Option<PathBuf>,
    pub log_directory: Option<PathBuf>,
}

impl TrackerConfig {
    /// Reads the user config file, creating it from the defaults first if
    /// needed. `clean_config` rewrites it with the defaults.
    pub fn load(clean_config: bool) -> ApplicationResult<(Self, PathBuf)> {
        let config_dir = flight_tracker_project_dir()?.config_dir().to_path_buf();
        let config_file = config_dir.join("config.toml");
        if clean_config || !config_file.exists() {
            fs::create_dir_all(&config_dir)?;
            fs::write(&config_file, DEFAULT_CONFIG)?;
            debug!(path = ?config_file, "Wrote default config");
        }
        let config = Self::from_file(&config_file)?;
        Ok((config, config_file))
    }

    pub fn from_file(path: &Path) -> ApplicationResult<Self> {
        Self::build(File::from(path).required(true))
    }

    fn build<S>(file: S) -> ApplicationResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(file)
            .add_source(Environment::with_prefix("FLIGHT_TRACKER").try_parsing(true))
            .build()?
            .try_deserialize::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, endpoint: Option<String>, poll_interval_ms: Option<u64>) {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        if let Some(poll_interval_ms) = poll_interval_ms {
            self.poll_interval_ms = poll_interval_ms;
        }
    }

    pub fn validate(&self) -> ApplicationResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ApplicationError::InvalidConfig(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.frame_interval_ms == 0 {
            return Err(ApplicationError::InvalidConfig(
                "frame_interval_ms must be greater than 0".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ApplicationError::InvalidConfig(
                "request_timeout_ms must be greater than 0".into(),
            ));
        }
        self.feed_url()?;
        Ok(())
    }

    pub fn feed_url(&self) -> ApplicationResult<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            ApplicationError::InvalidConfig(format!("endpoint '{}': {}", self.endpoint, e))
        })?;
        if let Some(status) = &self.status_filter {
            url.query_pairs_mut().append_pair("status", status);
        }
        Ok(url)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            stale_after_polls: self.stale_after_polls,
            recent_path_limit: self.recent_path_limit,
        }
    }

    pub fn to_toml(&self) -> ApplicationResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl TrackerConfig {
        pub fn new_for_test() -> Self {
            Self::from_toml("").expect("Failed to build default configuration")
        }

        pub fn from_toml(raw: &str) -> ApplicationResult<Self> {
            Self::build(File::from_str(raw, FileFormat::Toml))
        }
    }

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::new_for_test();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.animation_duration(), Duration::from_secs(5));
        assert_eq!(config.stale_after_polls, 3);
        assert_eq!(config.recent_path_limit, 10);
        assert!(config.geojson_output.is_none());
        assert_eq!(
            config.feed_url().unwrap().as_str(),
            "http://localhost:5000/api/flights?status=active"
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let config = TrackerConfig::from_toml(
            "endpoint = \"https://example.org/flights\"\npoll_interval_ms = 2500\ngeojson_output = \"out.geojson\"",
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, 2500);
        assert_eq!(config.frame_interval_ms, 16);
        assert_eq!(config.geojson_output, Some(PathBuf::from("out.geojson")));
        assert_eq!(
            config.feed_url().unwrap().as_str(),
            "https://example.org/flights?status=active"
        );
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = TrackerConfig::from_toml("poll_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let err = TrackerConfig::from_toml("request_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidConfig(_)));
        let mut config = TrackerConfig::new_for_test();
        config.request_timeout_ms = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let err = TrackerConfig::from_toml("endpoint = \"not a url\"").unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidConfig(_)));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = TrackerConfig::new_for_test();
        config.apply_overrides(Some("http://10.0.0.2/api/flights".into()), Some(1000));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.feed_url().unwrap().as_str().starts_with("http://10.0.0.2/"));
        config.apply_overrides(None, None);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_to_toml_skips_unset_paths() {
        let toml = TrackerConfig::new_for_test().to_toml().unwrap();
        assert!(toml.contains("poll_interval_ms = 10000"));
        assert!(!toml.contains("geojson_output"));
    }
}
