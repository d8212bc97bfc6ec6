//! Configuration builder for flexible configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use resumecp_types::ChunkSize;
use std::path::{Path, PathBuf};

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source; missing files are skipped at build time
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        // Defaults always form the base layer so partial files stay valid
        let defaults_value = serde_yaml::to_value(Config::default())
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .separator(&self.env_separator)
                            .try_parsing(true),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let config = self.inner.build()?;
        let result: Config = config.try_deserialize()?;

        Self::validate(&result)?;

        Ok(result)
    }

    /// Try to build the configuration, returning defaults on error
    pub fn build_or_default(self) -> Config {
        self.build().unwrap_or_default()
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate the configuration
    pub(crate) fn validate(config: &Config) -> ConfigResult<()> {
        let chunk = config.chunking.initial_chunk_size.get();
        if chunk < ChunkSize::MIN || chunk > ChunkSize::MAX {
            return Err(ConfigError::invalid_value(
                "chunking.initial_chunk_size".to_string(),
                format!("must be between {} and {}", ChunkSize::MIN, ChunkSize::MAX),
            ));
        }

        if config.chunking.target_chunk_duration.is_zero() {
            return Err(ConfigError::validation(
                "Target chunk duration must be greater than zero",
            ));
        }

        if config.chunking.read_block_size == 0 {
            return Err(ConfigError::validation(
                "Read block size must be greater than 0",
            ));
        }

        if config.checkpoint.suffix.is_empty()
            || config.checkpoint.suffix.contains(['/', '\\'])
        {
            return Err(ConfigError::invalid_value(
                "checkpoint.suffix".to_string(),
                "must be a non-empty file name suffix".to_string(),
            ));
        }

        config
            .retry
            .validate()
            .map_err(|message| ConfigError::invalid_value("retry".to_string(), message))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().add_defaults().build().unwrap();
        assert_eq!(config.chunking.initial_chunk_size, ChunkSize::default());
        assert_eq!(config.chunking.target_chunk_duration, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_missing_file_is_ignored() {
        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file("/definitely/not/here/resumecp.yaml")
            .build()
            .unwrap();
        assert!(config.checkpoint.sync_data);
    }

    #[test]
    fn test_builder_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("resumecp.toml");
        fs::write(
            &path,
            "[chunking]\nread_block_size = 8192\n\n[checkpoint]\nsync_data = false\n",
        )
        .unwrap();

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(&path)
            .build()
            .unwrap();

        assert_eq!(config.chunking.read_block_size, 8192);
        assert!(!config.checkpoint.sync_data);
        assert_eq!(config.checkpoint.suffix, "._chunks_");
    }

    #[test]
    fn test_validation_rejects_zero_block_size() {
        let mut config = Config::default();
        config.chunking.read_block_size = 0;
        assert!(ConfigBuilder::validate(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_path_in_suffix() {
        let mut config = Config::default();
        config.checkpoint.suffix = "../escape".to_string();
        assert!(ConfigBuilder::validate(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_backoff() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(ConfigBuilder::validate(&config).is_err());
    }
}
