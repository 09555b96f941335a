use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

use crate::infrastructure::logging::{LogConfig, LogFormat, LogOutput};

/// File name looked up by [`Config::discover`]
pub const CONFIG_FILE: &str = "dynbridge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid log level '{0}' (expected trace, debug, info, warn or error)")]
    InvalidLevel(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Directories tried before the OS loader's own search
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Libraries opened when a bridge is created
    #[serde(default)]
    pub preload: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Stdout,
    #[default]
    Stderr,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogTarget,

    /// Only used with `output = "file"`
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            output: LogTarget::default(),
            directory: default_directory(),
            filter: None,
        }
    }
}

fn default_level() -> String {
    "warn".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from("logs")
}

impl LoggingConfig {
    /// Subscriber settings, with the level raised once per `-v`
    pub fn to_log_config(&self, verbose: u8) -> Result<LogConfig, ConfigError> {
        let level: Level = self
            .level
            .parse()
            .map_err(|_| ConfigError::InvalidLevel(self.level.clone()))?;
        let output = match self.output {
            LogTarget::Stdout => LogOutput::Stdout,
            LogTarget::Stderr => LogOutput::Stderr,
            LogTarget::File => LogOutput::File {
                directory: self.directory.to_string_lossy().into_owned(),
                prefix: "dynbridge".to_string(),
            },
        };
        let mut config = LogConfig::new()
            .with_level(level)
            .with_format(self.format)
            .with_output(output)
            .raised(verbose);
        if let Some(filter) = &self.filter {
            config = config.with_filter(filter.clone());
        }
        Ok(config)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Nearest `dynbridge.toml` at or above `start`
    pub fn find(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load the nearest config above the working directory, or defaults
    ///
    /// A config file that exists but fails to parse is an error.
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn discover_from(start: &Path) -> Result<Self, ConfigError> {
        match Self::find(start) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using config file");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Default configuration rendered as TOML
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.loader.search_paths.is_empty());
        assert!(config.loader.preload.is_empty());
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.output, LogTarget::Stderr);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[loader]
search_paths = ["/opt/lib", "vendor"]
preload = ["libm.so.6"]

[logging]
level = "debug"
format = "json"
output = "file"
directory = "var/log"
filter = "dynbridge_runtime=trace"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.loader.search_paths, vec![PathBuf::from("/opt/lib"), PathBuf::from("vendor")]);
        assert_eq!(config.loader.preload, vec!["libm.so.6".to_string()]);

        let log = config.logging.to_log_config(0).unwrap();
        assert_eq!(log.level, Level::DEBUG);
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(
            log.output,
            LogOutput::File { directory: "var/log".to_string(), prefix: "dynbridge".to_string() }
        );
        assert_eq!(log.filter.as_deref(), Some("dynbridge_runtime=trace"));
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config = Config::parse("[logging]\nformat = \"pretty\"\n").unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.loader, LoaderConfig::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::parse("[loader]\nsearch_path = []\n").is_err());
        assert!(Config::parse("[logging]\nformat = \"xml\"\n").is_err());
    }

    #[test]
    fn test_verbosity_and_bad_level() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.to_log_config(1).unwrap().level, Level::INFO);

        let logging = LoggingConfig { level: "chatty".to_string(), ..LoggingConfig::default() };
        assert!(matches!(logging.to_log_config(0), Err(ConfigError::InvalidLevel(l)) if l == "chatty"));
    }

    #[test]
    fn test_discover_walks_upward() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join(CONFIG_FILE), "[loader]\npreload = [\"libz.so.1\"]\n").unwrap();

        assert_eq!(Config::find(&nested), Some(root.path().join(CONFIG_FILE)));
        let config = Config::discover_from(&nested).unwrap();
        assert_eq!(config.loader.preload, vec!["libz.so.1".to_string()]);
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[loader\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_generated_default_parses_back() {
        let text = Config::generate_default();
        assert_eq!(Config::parse(&text).unwrap(), Config::default());
    }
}
