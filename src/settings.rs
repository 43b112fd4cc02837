use crate::consts::{
    DEFAULT_BATCH_SIZE, DEFAULT_DATABASE, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_SOURCE_URL,
};
use anyhow::anyhow;
use config::{Config, File};
use serde::{de::IgnoredAny, Deserialize};
use std::{path::Path, time::Duration};
use url::Url;

pub const CONFIG_ENV: &str = "SERIES__CONFIG";
const ENV_PREFIX: &str = "SERIES";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub source: SourceSettings,
    pub tracing: TracingSettings,

    // `SERIES__CONFIG` itself ends up here
    pub config: IgnoredAny,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSettings {
    /// Root of the Sleepy Mongoose REST interface.
    pub url: Url,
    pub database: String,
    /// Number of rows requested per page. Zero is treated as one.
    pub batch_size: usize,
    /// Request timeout in seconds.
    pub request_timeout: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: Url::try_from(DEFAULT_SOURCE_URL).expect("valid url"),
            database: DEFAULT_DATABASE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl SourceSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingFormat {
    #[default]
    Default,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingSettings {
    pub enabled: bool,
    pub format: TracingFormat,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            format: TracingFormat::Default,
        }
    }
}

impl Settings {
    /// Reads the file named by `SERIES__CONFIG` (if set), then overrides it
    /// with `SERIES__*` environment variables.
    pub fn new() -> anyhow::Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        Self::build(config_path.as_deref().map(Path::new))
    }

    pub fn build(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(config_path) = config_path {
            builder = builder.add_source(File::from(config_path));
        };
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        builder
            .build()?
            .try_deserialize()
            .map_err(|err| anyhow!(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timeout_is_in_seconds() {
        let settings = SourceSettings {
            request_timeout: 3,
            ..Default::default()
        };
        assert_eq!(settings.http_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = std::env::temp_dir().join("series-settings-unknown-field");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[source]\nbatch = 10\n").unwrap();
        assert!(Settings::build(Some(path.as_path())).is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = std::env::temp_dir().join("series-settings-override");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            "[source]\ndatabase = \"staging\"\nbatch_size = 500\n\n[tracing]\nformat = \"json\"\n",
        )
        .unwrap();
        let settings = Settings::build(Some(path.as_path())).unwrap();
        assert_eq!(settings.source.database, "staging");
        assert_eq!(settings.source.batch_size, 500);
        assert_eq!(settings.source.url, SourceSettings::default().url);
        assert_eq!(settings.tracing.format, TracingFormat::Json);
    }
}
