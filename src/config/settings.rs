use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_MAX_IDLE_SECS, DEFAULT_RENDER_TIMEOUT_SECS,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
use crate::cache::CleanupConfig;
use crate::generator::RenderPaths;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required argument `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{0}`: {1}")]
    InvalidValue(&'static str, String),

    #[error("could not read config file [{path}]: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file [{path}]: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("not a directory: {0}")]
    InvalidDirectory(PathBuf),
}

/// Renderer and cache settings as they come from a TOML file or the command
/// line. Every field is optional; [`PartialSettings::resolve`] applies
/// defaults and checks the required ones.
///
/// ```toml
/// mermaid = "/usr/local/bin/mmdc"
/// input_dir = "/srv/mermaid/in"
/// output_dir = "/srv/mermaid/out"
/// puppeteer_config = "/srv/mermaid/puppeteer.json"
/// cleanup_interval_secs = 300
/// max_idle_secs = 3600
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialSettings {
    pub mermaid: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub puppeteer_config: Option<PathBuf>,
    pub render_timeout_secs: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub max_idle_secs: Option<u64>,
}

impl PartialSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Values set in `other` win over the ones in `self`.
    pub fn merge(self, other: PartialSettings) -> Self {
        Self {
            mermaid: other.mermaid.or(self.mermaid),
            input_dir: other.input_dir.or(self.input_dir),
            output_dir: other.output_dir.or(self.output_dir),
            puppeteer_config: other.puppeteer_config.or(self.puppeteer_config),
            render_timeout_secs: other.render_timeout_secs.or(self.render_timeout_secs),
            shutdown_timeout_secs: other.shutdown_timeout_secs.or(self.shutdown_timeout_secs),
            cleanup_interval_secs: other.cleanup_interval_secs.or(self.cleanup_interval_secs),
            max_idle_secs: other.max_idle_secs.or(self.max_idle_secs),
        }
    }

    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let mermaid = non_empty(self.mermaid).ok_or(ConfigError::Missing("mermaid"))?;
        let input_dir = non_empty(self.input_dir).ok_or(ConfigError::Missing("in"))?;
        let output_dir = non_empty(self.output_dir).ok_or(ConfigError::Missing("out"))?;

        let render_timeout_secs = positive(
            "render_timeout_secs",
            self.render_timeout_secs.unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS),
        )?;
        let cleanup_interval_secs = positive(
            "cleanup_interval_secs",
            self.cleanup_interval_secs.unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS),
        )?;

        Ok(Settings {
            mermaid,
            input_dir,
            output_dir,
            puppeteer_config: non_empty(self.puppeteer_config),
            render_timeout_secs,
            shutdown_timeout_secs: self
                .shutdown_timeout_secs
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            cleanup: CleanupConfig {
                interval_secs: cleanup_interval_secs,
                max_idle_secs: self.max_idle_secs.unwrap_or(DEFAULT_MAX_IDLE_SECS),
            },
        })
    }
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue(key, "must be greater than zero".into()));
    }
    Ok(value)
}

/// Fully resolved service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub mermaid: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub puppeteer_config: Option<PathBuf>,
    pub render_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub cleanup: CleanupConfig,
}

impl Settings {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn render_paths(&self) -> RenderPaths {
        RenderPaths::new(&self.input_dir, &self.output_dir)
            .with_puppeteer_config(self.puppeteer_config.clone())
    }

    /// Creates the input and output directories when they do not exist yet.
    pub fn prepare_directories(&self) -> Result<(), ConfigError> {
        for dir in [&self.input_dir, &self.output_dir] {
            if dir.exists() && !dir.is_dir() {
                return Err(ConfigError::InvalidDirectory(dir.clone()));
            }
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
