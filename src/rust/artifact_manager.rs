use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};

use crate::classifier::ArtifactLoadError;

pub const DEFAULT_VECTORIZER_FILE: &str = "vectorizer.json";
pub const DEFAULT_CLASSIFIER_FILE: &str = "classifier.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Expected SHA-256 digests of the artifact pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub vectorizer: String,
    pub classifier: String,
    /// Digests of extra files the classifier references, keyed by file name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Where to download an artifact bundle from.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSource {
    pub vectorizer_url: String,
    pub classifier_url: String,
    pub vectorizer_sha256: Option<String>,
    pub classifier_sha256: Option<String>,
}

/// Locates, verifies and fetches the vectorizer/classifier pair on disk.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    artifacts_dir: PathBuf,
    vectorizer_file: String,
    classifier_file: String,
    download_lock: Arc<Mutex<()>>,
}

/// Sibling path a download is written to before it replaces `path`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".download");
    path.with_file_name(name)
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl ArtifactManager {
    /// Creates a new ArtifactManager with the default artifacts directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_artifacts_dir())
    }

    /// Returns the default artifacts directory path
    pub fn get_default_artifacts_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("SPAMDETECT_HOME") {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("spamdetect").join("artifacts");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("spamdetect").join("artifacts");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("spamdetect").join("artifacts")
    }

    pub fn new<P: AsRef<Path>>(artifacts_dir: P) -> io::Result<Self> {
        let artifacts_dir = artifacts_dir.as_ref().to_path_buf();
        fs::create_dir_all(&artifacts_dir)?;
        Ok(Self {
            artifacts_dir,
            vectorizer_file: DEFAULT_VECTORIZER_FILE.to_string(),
            classifier_file: DEFAULT_CLASSIFIER_FILE.to_string(),
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Overrides the artifact file names. Absolute paths are used as given.
    pub fn with_file_names(mut self, vectorizer_file: &str, classifier_file: &str) -> Self {
        self.vectorizer_file = vectorizer_file.to_string();
        self.classifier_file = classifier_file.to_string();
        self
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn vectorizer_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.vectorizer_file)
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.classifier_file)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.artifacts_dir.join(MANIFEST_FILE)
    }

    pub fn are_artifacts_present(&self) -> bool {
        let vectorizer_path = self.vectorizer_path();
        let classifier_path = self.classifier_path();
        log::debug!("Checking artifacts:");
        log::debug!("  Vectorizer path: {:?} (exists: {})", vectorizer_path, vectorizer_path.exists());
        log::debug!("  Classifier path: {:?} (exists: {})", classifier_path, classifier_path.exists());
        vectorizer_path.exists() && classifier_path.exists()
    }

    fn hash_file(path: &Path) -> Result<String, ArtifactLoadError> {
        let bytes = fs::read(path)?;
        Ok(sha256_hex(&bytes))
    }

    pub fn read_manifest(&self) -> Result<Option<Manifest>, ArtifactLoadError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ArtifactLoadError::Malformed { artifact: "manifest", source })
    }

    /// Hashes both artifacts (plus any `extra` files) and writes `manifest.json`.
    pub fn write_manifest(&self, extra_files: &[&str]) -> Result<Manifest, ArtifactLoadError> {
        if !self.are_artifacts_present() {
            let missing = if self.vectorizer_path().exists() {
                self.classifier_path()
            } else {
                self.vectorizer_path()
            };
            return Err(ArtifactLoadError::NotFound(missing));
        }

        let mut extra = BTreeMap::new();
        for name in extra_files {
            extra.insert(name.to_string(), Self::hash_file(&self.artifacts_dir.join(name))?);
        }
        let manifest = Manifest {
            vectorizer: Self::hash_file(&self.vectorizer_path())?,
            classifier: Self::hash_file(&self.classifier_path())?,
            extra,
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|source| ArtifactLoadError::Malformed { artifact: "manifest", source })?;
        fs::write(self.manifest_path(), json)?;
        log::info!("Wrote artifact manifest to {:?}", self.manifest_path());
        Ok(manifest)
    }

    /// Checks the artifacts against the manifest.
    ///
    /// Returns `false` when a file is missing or a digest differs. Without a
    /// manifest there is nothing to compare against, so present files pass.
    pub fn verify_artifacts(&self) -> Result<bool, ArtifactLoadError> {
        if !self.are_artifacts_present() {
            log::info!("One or both artifact files do not exist");
            return Ok(false);
        }

        let Some(manifest) = self.read_manifest()? else {
            log::warn!("No manifest at {:?}; skipping checksum verification", self.manifest_path());
            return Ok(true);
        };

        let vectorizer_ok = Self::hash_file(&self.vectorizer_path())? == manifest.vectorizer;
        let classifier_ok = Self::hash_file(&self.classifier_path())? == manifest.classifier;
        let mut extra_ok = true;
        for (name, expected) in &manifest.extra {
            let path = self.artifacts_dir.join(name);
            if !path.exists() || Self::hash_file(&path)? != *expected {
                log::warn!("Extra artifact {:?} failed verification", path);
                extra_ok = false;
            }
        }

        log::info!("Verification results:");
        log::info!("  Vectorizer hash verification: {}", vectorizer_ok);
        log::info!("  Classifier hash verification: {}", classifier_ok);

        Ok(vectorizer_ok && classifier_ok && extra_ok)
    }

    async fn download_and_verify_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<String, ArtifactLoadError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?.error_for_status()?;
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = sha256_hex(&bytes);
        if let Some(expected) = expected_hash {
            if !hash.eq_ignore_ascii_case(expected) {
                log::error!("{} hash mismatch: expected {}, got {}", file_type, expected, hash);
                return Err(ArtifactLoadError::HashMismatch {
                    file_type: file_type.to_string(),
                    expected: expected.to_string(),
                    actual: hash,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;
        log::info!("{} file downloaded successfully", file_type);
        Ok(hash)
    }

    /// Downloads both artifacts next to their targets, verifies any expected
    /// digests, then moves them into place and rewrites the manifest.
    ///
    /// A failed fetch removes only its own partial downloads; an installed
    /// bundle stays untouched.
    pub async fn fetch(&self, source: &ArtifactSource) -> Result<Manifest, ArtifactLoadError> {
        let _lock = self.download_lock.lock().await;
        fs::create_dir_all(&self.artifacts_dir)?;

        let vectorizer_path = self.vectorizer_path();
        let classifier_path = self.classifier_path();
        let staged = [
            (staging_path(&vectorizer_path), vectorizer_path),
            (staging_path(&classifier_path), classifier_path),
        ];

        let result = async {
            let vectorizer = self
                .download_and_verify_file(
                    &source.vectorizer_url,
                    &staged[0].0,
                    source.vectorizer_sha256.as_deref(),
                    "vectorizer",
                )
                .await?;
            let classifier = self
                .download_and_verify_file(
                    &source.classifier_url,
                    &staged[1].0,
                    source.classifier_sha256.as_deref(),
                    "classifier",
                )
                .await?;
            Ok::<_, ArtifactLoadError>(Manifest {
                vectorizer,
                classifier,
                extra: BTreeMap::new(),
            })
        }
        .await;

        match result {
            Ok(manifest) => {
                for (staging, target) in &staged {
                    fs::rename(staging, target)?;
                }
                let json = serde_json::to_vec_pretty(&manifest)
                    .map_err(|source| ArtifactLoadError::Malformed { artifact: "manifest", source })?;
                fs::write(self.manifest_path(), json)?;
                log::info!("Artifacts ready to use");
                Ok(manifest)
            }
            Err(e) => {
                log::error!("Failed to fetch artifacts: {}", e);
                for (staging, _) in &staged {
                    if staging.exists() {
                        if let Err(err) = fs::remove_file(staging) {
                            log::warn!("Could not remove partial download {:?}: {}", staging, err);
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Removes both artifacts and the manifest, ignoring files that are absent.
    pub fn remove_artifacts(&self) -> Result<(), ArtifactLoadError> {
        for path in [self.vectorizer_path(), self.classifier_path(), self.manifest_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Ensures the artifacts are present and verified, fetching them if not.
    pub async fn ensure_artifacts(&self, source: &ArtifactSource) -> Result<(), ArtifactLoadError> {
        if !self.are_artifacts_present() {
            log::info!("Artifacts not found, downloading...");
            self.fetch(source).await?;
        } else if !self.verify_artifacts()? {
            log::info!("Artifact verification failed, re-downloading...");
            self.remove_artifacts()?;
            self.fetch(source).await?;
        } else {
            log::info!("Artifact verification successful");
        }
        Ok(())
    }
}
