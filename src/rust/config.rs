use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;

use crate::artifact_manager::{ArtifactManager, DEFAULT_CLASSIFIER_FILE, DEFAULT_VECTORIZER_FILE};
use crate::classifier::ArtifactLoadError;
use crate::runtime::RuntimeConfig;

/// Where the artifact bundle lives and how to load it.
///
/// Values are layered: built-in defaults, then an optional JSON file, then
/// `SPAMDETECT_*` environment variables, then whatever the caller sets last.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub artifacts_dir: PathBuf,
    /// File name (or path) of the vectorizer, relative to `artifacts_dir`
    pub vectorizer_file: String,
    /// File name (or path) of the classifier, relative to `artifacts_dir`
    pub classifier_file: String,
    /// Check both files against `manifest.json` before loading
    pub verify_checksums: bool,
    pub runtime: RuntimeConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: ArtifactManager::get_default_artifacts_dir(),
            vectorizer_file: DEFAULT_VECTORIZER_FILE.to_string(),
            classifier_file: DEFAULT_CLASSIFIER_FILE.to_string(),
            verify_checksums: true,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads a JSON config file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ArtifactLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ArtifactLoadError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|source| ArtifactLoadError::Malformed {
            artifact: "config",
            source,
        })
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `SPAMDETECT_HOME`, `SPAMDETECT_VECTORIZER`,
    /// `SPAMDETECT_CLASSIFIER` and `SPAMDETECT_VERIFY`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = env::var("SPAMDETECT_HOME") {
            self.artifacts_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var("SPAMDETECT_VECTORIZER") {
            self.vectorizer_file = file;
        }
        if let Ok(file) = env::var("SPAMDETECT_CLASSIFIER") {
            self.classifier_file = file;
        }
        if let Ok(value) = env::var("SPAMDETECT_VERIFY") {
            self.verify_checksums = !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off");
        }
        self
    }
}
