//! Persistent fixture parameters
//!
//! Independent from the hardware profile: a missing or corrupt file only
//! costs the stored values, never startup.

use std::path::{Path, PathBuf};

use fixture_core::{FixtureError, FixtureParams, Result};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

/// Date format written to `last_modified`
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fixture parameters bound to their backing file
pub struct FixtureParamsStore {
    path: PathBuf,
    params: FixtureParams,
}

impl FixtureParamsStore {
    /// Load parameters from `path`, falling back to an empty map.
    pub async fn load(path: &Path) -> Self {
        let params = match fs::read_to_string(path).await {
            Ok(content) => match FixtureParams::from_json(&content) {
                Ok(params) => {
                    info!(
                        "Loaded {} fixture parameter(s) from {}",
                        params.len(),
                        path.display()
                    );
                    params
                }
                Err(e) => {
                    warn!(
                        "Error loading fixture config {}: {}. Starting with no parameters.",
                        path.display(),
                        e
                    );
                    FixtureParams::empty()
                }
            },
            Err(e) => {
                warn!(
                    "Error loading fixture config {}: {}. Starting with no parameters.",
                    path.display(),
                    e
                );
                FixtureParams::empty()
            }
        };

        Self {
            path: path.to_path_buf(),
            params,
        }
    }

    /// A store that has never been saved
    pub fn in_memory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            params: FixtureParams::empty(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn params(&self) -> &FixtureParams {
        &self.params
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Store `value` under `key` and persist the whole map.
    pub async fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.params.set(key, value);
        self.save().await
    }

    /// Stamp today's date and write the file.
    pub async fn save(&mut self) -> Result<()> {
        self.params
            .stamp(chrono::Local::now().format(DATE_FORMAT).to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = self.params.to_json()?;
        fs::write(&self.path, json).await.map_err(|e| {
            FixtureError::Config(format!(
                "Failed to write fixture config {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!("Saved fixture parameters to {}", self.path.display());
        Ok(())
    }
}
