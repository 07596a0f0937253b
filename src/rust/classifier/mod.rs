mod builder;
mod error;
pub mod model;
#[cfg(feature = "onnx")]
mod onnx;
mod service;
mod utils;
pub mod vectorizer;
mod verdict;

pub use builder::InferenceServiceBuilder;
pub use error::{ArtifactLoadError, ClassifierError, EMPTY_INPUT_MESSAGE};
pub use model::{
    ClassifierArtifact, ClassifierCapability, LabelOnlyClassifier, LinearSvc, LogisticRegression,
    MultinomialNb, ProbabilisticClassifier,
};
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;
pub use service::{ClassificationRequest, InferenceService, ServiceInfo};
pub use vectorizer::{TextVectorizer, Vectorizer, VectorizerArtifact};
pub use verdict::{SpamLabel, Verdict, HAM_LABEL, SPAM_LABEL};
