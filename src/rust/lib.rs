//! Spam/ham classification of email text over a pre-trained vectorizer and
//! classifier.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use spamdetect::{InferenceService, SpamLabel};
//!
//! let service = InferenceService::builder()
//!     .with_vectorizer_file("artifacts/vectorizer.json")?
//!     .with_classifier_file("artifacts/classifier.json")?
//!     .build()?;
//!
//! let verdict = service.classify_text("Congratulations! You won a free cruise")?;
//! if verdict.label == SpamLabel::Spam {
//!     println!("Spam ({:.2}%)", verdict.spam_probability);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # In-memory artifacts
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::collections::HashMap;
//! use spamdetect::{ClassifierCapability, InferenceService, LogisticRegression,
//!     SpamLabel, TextVectorizer, VectorizerArtifact};
//!
//! let vocabulary: HashMap<String, usize> =
//!     [("free".to_string(), 0), ("meeting".to_string(), 1)].into_iter().collect();
//! let vectorizer = TextVectorizer::from_artifact(VectorizerArtifact::tfidf(vocabulary, vec![1.0, 1.0]))?;
//! let classifier = LogisticRegression::new(&[0, 1], vec![3.0, -3.0], 0.0)?;
//!
//! let service = InferenceService::builder()
//!     .with_vectorizer(vectorizer)
//!     .with_classifier(ClassifierCapability::probabilistic(classifier))
//!     .build()?;
//!
//! let verdict = service.classify_text("FREE entry, reply now")?;
//! assert_eq!(verdict.label, SpamLabel::Spam);
//! assert!((verdict.spam_probability + verdict.ham_probability - 100.0).abs() < 0.01);
//! # Ok(())
//! # }
//! ```

pub mod artifact_manager;
pub mod classifier;
pub mod config;
mod runtime;

pub use artifact_manager::{ArtifactManager, ArtifactSource, Manifest};
pub use classifier::{
    ArtifactLoadError, ClassificationRequest, ClassifierArtifact, ClassifierCapability, ClassifierError,
    InferenceService, InferenceServiceBuilder, LabelOnlyClassifier, LinearSvc, LogisticRegression,
    MultinomialNb, ProbabilisticClassifier, ServiceInfo, SpamLabel, TextVectorizer, Vectorizer,
    VectorizerArtifact, Verdict, EMPTY_INPUT_MESSAGE,
};
#[cfg(feature = "onnx")]
pub use classifier::OnnxClassifier;
pub use config::ServiceConfig;
#[cfg(feature = "onnx")]
pub use runtime::{create_session_builder, ensure_initialized};
pub use runtime::{OptimizationLevel, RuntimeConfig};

/// Installs `env_logger` with a `warn` default that `RUST_LOG` overrides.
/// Later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).try_init();
}
