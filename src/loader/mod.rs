//! Generic configuration loading utilities.

use std::{fs, path::PathBuf};

use config::{Config, File, FileFormat};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Error when reading the configuration file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error when parsing the configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Error when the configuration format is unsupported.
    #[error("Unsupported configuration format")]
    UnsupportedFormat,
}

/// A generic loader for YAML files.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new `ConfigLoader`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the value stored under the top-level `key` of the YAML file.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<T, LoaderError> {
        if !self.is_yaml_file() {
            return Err(LoaderError::UnsupportedFormat);
        }

        let raw = fs::read_to_string(&self.path)?;
        let config = Config::builder().add_source(File::from_str(&raw, FileFormat::Yaml)).build()?;

        Ok(config.get(key)?)
    }

    /// Checks if the file has a YAML extension.
    fn is_yaml_file(&self) -> bool {
        matches!(self.path.extension().and_then(|ext| ext.to_str()), Some("yaml") | Some("yml"))
    }
}

/// A trait for types that can be loaded from a configuration file.
pub trait Loadable: Sized + DeserializeOwned {
    /// The top-level key in the YAML file (e.g., "route").
    const KEY: &'static str;

    /// The specific error type for this loadable item.
    type Error: From<LoaderError>;

    /// Post-deserialization checks. Defaults to accepting the item as is.
    fn validate(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Loads and validates a `Loadable` item from a configuration file.
pub fn load_config<T: Loadable>(path: PathBuf) -> Result<T, T::Error> {
    let mut item: T = ConfigLoader::new(path).load(T::KEY)?;
    item.validate()?;
    Ok(item)
}
