use std::fmt;
use std::io;
use std::path::PathBuf;

use super::verdict::SpamLabel;

/// Message shown to a caller who submits nothing to classify.
pub const EMPTY_INPUT_MESSAGE: &str = "Please enter an email message to classify.";

/// Errors raised while loading or validating the artifact bundle.
///
/// These are startup failures: a process that hits one should not go on to
/// serve classification requests.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactLoadError {
    #[error("Artifact not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Malformed {artifact} artifact: {source}")]
    Malformed {
        artifact: &'static str,
        source: serde_json::Error,
    },
    #[error("Invalid {artifact} artifact: {reason}")]
    Invalid {
        artifact: &'static str,
        reason: String,
    },
    #[error("Feature dimension mismatch: vectorizer produces {vectorizer} features, classifier expects {classifier}")]
    DimensionMismatch { vectorizer: usize, classifier: usize },
    #[error("Unsupported class labels {0:?}: expected [0, 1] (0 = ham, 1 = spam)")]
    LabelConvention(Vec<i64>),
    #[error("ONNX Runtime error: {0}")]
    RuntimeError(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
    #[error("Build error: {0}")]
    BuildError(String),
}

#[cfg(feature = "onnx")]
impl<R> From<ort::Error<R>> for ArtifactLoadError {
    fn from(err: ort::Error<R>) -> Self {
        ArtifactLoadError::RuntimeError(err.to_string())
    }
}

/// Represents the different types of errors that can occur while classifying text.
#[derive(Debug)]
pub enum ClassifierError {
    /// The submitted text was empty or whitespace-only
    EmptyInput,
    /// The artifact bundle could not be loaded
    ArtifactLoad(ArtifactLoadError),
    /// Error occurred while turning text into a feature vector
    VectorizerError(String),
    /// Error occurred while running the classifier
    PredictionError(String),
    /// The classifier produced a label outside the 0 = ham / 1 = spam convention
    UnknownLabel(i64),
    /// The predicted label and the probability distribution favor different classes
    InconsistentPrediction {
        label: SpamLabel,
        spam_probability: f64,
    },
}

impl ClassifierError {
    /// True for errors the caller caused and can fix by resubmitting.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::EmptyInput)
    }
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "{}", EMPTY_INPUT_MESSAGE),
            Self::ArtifactLoad(err) => write!(f, "Artifact load error: {}", err),
            Self::VectorizerError(msg) => write!(f, "Vectorizer error: {}", msg),
            Self::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
            Self::UnknownLabel(raw) => write!(
                f,
                "Classifier returned label {} which is neither 0 (ham) nor 1 (spam)",
                raw
            ),
            Self::InconsistentPrediction { label, spam_probability } => write!(
                f,
                "Classifier predicted {} but assigned {:.2}% to spam",
                label, spam_probability
            ),
        }
    }
}

impl std::error::Error for ClassifierError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ArtifactLoad(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ArtifactLoadError> for ClassifierError {
    fn from(err: ArtifactLoadError) -> Self {
        ClassifierError::ArtifactLoad(err)
    }
}

#[cfg(feature = "onnx")]
impl<R> From<ort::Error<R>> for ClassifierError {
    fn from(err: ort::Error<R>) -> Self {
        ClassifierError::PredictionError(err.to_string())
    }
}
