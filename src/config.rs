use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::IngestError;

pub const DEFAULT_CONFIG_FILE: &str = "pharmit-ingest.json";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub toolkit_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub database: Utf8PathBuf,
    pub toolkit_dir: Option<PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or [`DEFAULT_CONFIG_FILE`] when it exists. Without
    /// either, built-in defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        match config.schema_version {
            None | Some(SCHEMA_VERSION) => {}
            Some(other) => {
                return Err(IngestError::ConfigParse(format!(
                    "unsupported schema_version {other}, expected {SCHEMA_VERSION}"
                )));
            }
        }
        let database = match config.database {
            Some(path) => Utf8PathBuf::from(path),
            None => default_database_path()?,
        };
        Ok(ResolvedConfig {
            database,
            toolkit_dir: config.toolkit_dir.map(PathBuf::from),
        })
    }
}

pub fn default_database_path() -> Result<Utf8PathBuf, IngestError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_dir().join("pharmit-ingest").join("conformers.db"))
                .ok()
        })
        .ok_or_else(|| IngestError::Filesystem("unable to resolve data directory".to_string()))
}

/// Knobs of conformer generation and filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConformerParams {
    pub max_confs: usize,
    pub sample_multiplier: f64,
    pub seed: u64,
    pub rms_threshold: f64,
    pub energy_window: f64,
}

impl Default for ConformerParams {
    fn default() -> Self {
        Self {
            max_confs: 20,
            sample_multiplier: 1.0,
            seed: 9_162_006,
            rms_threshold: 0.7,
            energy_window: 10.0,
        }
    }
}

impl ConformerParams {
    /// Number of candidate embeddings: `floor(sample_multiplier * max_confs)`.
    pub fn sample_count(&self) -> usize {
        (self.sample_multiplier * self.max_confs as f64).floor() as usize
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        let checks = [
            ("sample multiplier", self.sample_multiplier),
            ("rms threshold", self.rms_threshold),
            ("energy window", self.energy_window),
        ];
        for (label, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(IngestError::InvalidParameter(format!(
                    "{label} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Reads one storage root per line. Entries that are not existing
/// directories are warned about and skipped.
pub fn load_prefixes(path: &Path) -> Result<Vec<Utf8PathBuf>, IngestError> {
    let content =
        fs::read_to_string(path).map_err(|_| IngestError::PrefixRead(path.to_path_buf()))?;
    let mut prefixes = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let candidate = Utf8PathBuf::from(line);
        if candidate.as_std_path().is_dir() {
            prefixes.push(candidate);
        } else {
            warn!(prefix = line, "prefix is not a directory, skipping");
        }
    }
    if prefixes.is_empty() {
        return Err(IngestError::NoPrefixes);
    }
    Ok(prefixes)
}
