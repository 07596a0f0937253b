use std::path::PathBuf;
use ndarray::Array1;
use serde::Serialize;
use log::{debug, error};

use super::builder::InferenceServiceBuilder;
use super::error::{ArtifactLoadError, ClassifierError};
use super::model::ClassifierCapability;
use super::vectorizer::Vectorizer;
use super::verdict::{SpamLabel, Verdict};
use crate::artifact_manager::ArtifactManager;
use crate::config::ServiceConfig;

/// Probability distributions may drift this far from summing to one before
/// they are rejected; ONNX graphs compute in f32.
const DISTRIBUTION_TOLERANCE: f64 = 1e-4;

/// Raw email text that has passed boundary validation.
///
/// Construction is the only place empty input is rejected, so a request that
/// reaches the service always carries some non-whitespace text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    text: String,
}

impl ClassificationRequest {
    pub fn new(text: impl Into<String>) -> Result<Self, ClassifierError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ClassifierError::EmptyInput);
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Describes the loaded artifact bundle.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub vectorizer_path: Option<PathBuf>,
    pub classifier_path: Option<PathBuf>,
    pub vectorizer_kind: String,
    pub classifier_kind: String,
    pub n_features: usize,
    pub supports_probabilities: bool,
}

/// Owns the fitted vectorizer and classifier and turns text into verdicts.
///
/// The artifacts are loaded once, never mutated and never reloaded, so one
/// service can be shared by reference or through an `Arc` across threads:
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use spamdetect::InferenceService;
/// use std::sync::Arc;
/// use std::thread;
///
/// let service = Arc::new(InferenceService::builder()
///     .with_vectorizer_file("artifacts/vectorizer.json")?
///     .with_classifier_file("artifacts/classifier.json")?
///     .build()?);
///
/// let service_clone = Arc::clone(&service);
/// thread::spawn(move || {
///     service_clone.classify_text("Claim your free prize now").unwrap();
/// });
/// # Ok(())
/// # }
/// ```
pub struct InferenceService {
    pub(crate) vectorizer: Box<dyn Vectorizer>,
    pub(crate) classifier: ClassifierCapability,
    pub(crate) vectorizer_path: Option<PathBuf>,
    pub(crate) classifier_path: Option<PathBuf>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<InferenceService>();
    }
};

impl std::fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceService")
            .field("vectorizer", &self.vectorizer.kind())
            .field("classifier", &self.classifier)
            .field("vectorizer_path", &self.vectorizer_path)
            .field("classifier_path", &self.classifier_path)
            .finish()
    }
}

impl InferenceService {
    /// Creates a new InferenceServiceBuilder for fluent construction
    pub fn builder() -> InferenceServiceBuilder {
        InferenceServiceBuilder::new()
    }

    /// Resolves the artifact paths from `config`, verifies them against the
    /// manifest when asked to, and loads both artifacts.
    pub fn load(config: &ServiceConfig) -> Result<Self, ArtifactLoadError> {
        let manager = ArtifactManager::new(&config.artifacts_dir)?
            .with_file_names(&config.vectorizer_file, &config.classifier_file);

        if config.verify_checksums && !manager.verify_artifacts()? {
            error!("Artifact verification failed in {:?}", manager.artifacts_dir());
            return Err(ArtifactLoadError::BuildError(format!(
                "Artifacts in {:?} are missing or do not match {:?}",
                manager.artifacts_dir(),
                manager.manifest_path()
            )));
        }

        Self::builder()
            .with_runtime_config(config.runtime.clone())
            .with_vectorizer_file(manager.vectorizer_path())?
            .with_classifier_file(manager.classifier_path())?
            .build()
    }

    /// Returns information about the loaded artifacts
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            vectorizer_path: self.vectorizer_path.clone(),
            classifier_path: self.classifier_path.clone(),
            vectorizer_kind: self.vectorizer.kind().to_string(),
            classifier_kind: self.classifier.kind().to_string(),
            n_features: self.vectorizer.n_features(),
            supports_probabilities: self.classifier.supports_probabilities(),
        }
    }

    /// Validates `text` and classifies it.
    ///
    /// Empty or whitespace-only text fails with `ClassifierError::EmptyInput`
    /// without touching the artifacts.
    pub fn classify_text(&self, text: &str) -> Result<Verdict, ClassifierError> {
        let request = ClassificationRequest::new(text)?;
        self.classify(&request)
    }

    /// Classifies one validated request.
    ///
    /// Classifiers without probability support yield a degenerate
    /// distribution: 100% on the predicted class and 0% on the other.
    pub fn classify(&self, request: &ClassificationRequest) -> Result<Verdict, ClassifierError> {
        let features = self.vectorizer.transform(request.text())?;
        if features.len() != self.vectorizer.n_features() {
            return Err(ClassifierError::VectorizerError(format!(
                "vectorizer produced {} features, expected {}",
                features.len(),
                self.vectorizer.n_features()
            )));
        }

        let (label, distribution) = match &self.classifier {
            ClassifierCapability::Probabilistic(model) => {
                let (raw_label, proba) = model.predict_with_proba(&features)?;
                (SpamLabel::try_from(raw_label)?, Self::ham_spam_distribution(&proba)?)
            }
            ClassifierCapability::LabelOnly(model) => {
                let label = SpamLabel::try_from(model.predict(&features)?)?;
                let distribution = match label {
                    SpamLabel::Ham => [1.0, 0.0],
                    SpamLabel::Spam => [0.0, 1.0],
                };
                (label, distribution)
            }
        };

        let verdict = Verdict {
            label,
            ham_probability: distribution[0] * 100.0,
            spam_probability: distribution[1] * 100.0,
        };
        Self::check_consistency(&verdict)?;

        debug!(
            "Classified {} chars as {} (spam {:.2}%, ham {:.2}%)",
            request.text().len(),
            verdict.label,
            verdict.spam_probability,
            verdict.ham_probability
        );
        Ok(verdict)
    }

    /// Transforms text with the held vectorizer without classifying it.
    pub fn features(&self, request: &ClassificationRequest) -> Result<Array1<f64>, ClassifierError> {
        self.vectorizer.transform(request.text())
    }

    /// Orders a probability vector as [ham, spam]. The builder guarantees the
    /// classifier's classes are [0, 1], so class order already matches.
    fn ham_spam_distribution(proba: &[f64]) -> Result<[f64; 2], ClassifierError> {
        let [ham, spam] = match proba {
            [ham, spam] => [*ham, *spam],
            other => {
                return Err(ClassifierError::PredictionError(format!(
                    "expected 2 class probabilities, got {}",
                    other.len()
                )))
            }
        };
        let in_range = |p: f64| p.is_finite() && (-DISTRIBUTION_TOLERANCE..=1.0 + DISTRIBUTION_TOLERANCE).contains(&p);
        if !in_range(ham) || !in_range(spam) || ((ham + spam) - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(ClassifierError::PredictionError(format!(
                "invalid probability distribution [{}, {}]",
                ham, spam
            )));
        }
        Ok([ham, spam])
    }

    /// A label must never contradict the distribution; an exact tie is allowed
    /// either way.
    fn check_consistency(verdict: &Verdict) -> Result<(), ClassifierError> {
        let contradicts = match verdict.label {
            SpamLabel::Spam => verdict.spam_probability < verdict.ham_probability,
            SpamLabel::Ham => verdict.spam_probability > verdict.ham_probability,
        };
        if contradicts {
            error!(
                "Classifier predicted {} with spam probability {:.2}%",
                verdict.label, verdict.spam_probability
            );
            return Err(ClassifierError::InconsistentPrediction {
                label: verdict.label,
                spam_probability: verdict.spam_probability,
            });
        }
        Ok(())
    }
}
