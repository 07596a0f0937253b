use std::path::{Path, PathBuf};
use log::{error, info};

use super::error::ArtifactLoadError;
use super::model::{load_classifier, ClassifierCapability};
use super::service::InferenceService;
use super::vectorizer::{TextVectorizer, Vectorizer};
use super::verdict::{HAM_LABEL, SPAM_LABEL};
use crate::runtime::RuntimeConfig;

/// A builder for constructing an InferenceService with a fluent interface.
///
/// Artifacts come either from files (`with_vectorizer_file`,
/// `with_classifier_file`) or from in-memory implementations
/// (`with_vectorizer`, `with_classifier`). `build` refuses bundles whose
/// halves do not fit together.
#[derive(Default)]
pub struct InferenceServiceBuilder {
    vectorizer_path: Option<PathBuf>,
    classifier_path: Option<PathBuf>,
    vectorizer: Option<Box<dyn Vectorizer>>,
    classifier: Option<ClassifierCapability>,
    runtime_config: RuntimeConfig,
}

impl InferenceServiceBuilder {
    /// Creates a new empty builder with the default runtime configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ONNX Runtime configuration used by `with_classifier_file`.
    ///
    /// Call this before loading an ONNX classifier for it to take effect.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Loads the vectorizer artifact from a JSON file
    ///
    /// # Errors
    /// - The vectorizer is already set
    /// - The file is missing, unreadable or malformed
    /// - The artifact fails validation
    pub fn with_vectorizer_file(mut self, path: impl AsRef<Path>) -> Result<Self, ArtifactLoadError> {
        if self.vectorizer.is_some() {
            return Err(ArtifactLoadError::BuildError("Vectorizer already set".to_string()));
        }
        let path = path.as_ref();
        let vectorizer = TextVectorizer::from_file(path).map_err(|e| {
            error!("Failed to load vectorizer from {:?}: {}", path, e);
            e
        })?;
        self.vectorizer = Some(Box::new(vectorizer));
        self.vectorizer_path = Some(path.to_path_buf());
        Ok(self)
    }

    /// Loads the classifier artifact from a JSON file
    ///
    /// # Errors
    /// - The classifier is already set
    /// - The file (or the ONNX graph it points at) is missing, unreadable or malformed
    /// - The artifact fails validation
    pub fn with_classifier_file(mut self, path: impl AsRef<Path>) -> Result<Self, ArtifactLoadError> {
        if self.classifier.is_some() {
            return Err(ArtifactLoadError::BuildError("Classifier already set".to_string()));
        }
        let path = path.as_ref();
        let classifier = load_classifier(path, &self.runtime_config).map_err(|e| {
            error!("Failed to load classifier from {:?}: {}", path, e);
            e
        })?;
        self.classifier = Some(classifier);
        self.classifier_path = Some(path.to_path_buf());
        Ok(self)
    }

    /// Uses an already constructed vectorizer, replacing any previous one
    pub fn with_vectorizer(mut self, vectorizer: impl Vectorizer + 'static) -> Self {
        self.vectorizer = Some(Box::new(vectorizer));
        self.vectorizer_path = None;
        self
    }

    /// Uses an already constructed classifier, replacing any previous one
    pub fn with_classifier(mut self, classifier: ClassifierCapability) -> Self {
        self.classifier = Some(classifier);
        self.classifier_path = None;
        self
    }

    /// Builds the service after checking the artifacts are compatible
    ///
    /// # Errors
    /// - Either artifact is missing
    /// - The vectorizer's output width differs from the classifier's input width
    /// - The classifier's classes are not exactly [0, 1]
    pub fn build(self) -> Result<InferenceService, ArtifactLoadError> {
        let vectorizer = self
            .vectorizer
            .ok_or_else(|| ArtifactLoadError::BuildError("Vectorizer must be set".to_string()))?;
        let classifier = self
            .classifier
            .ok_or_else(|| ArtifactLoadError::BuildError("Classifier must be set".to_string()))?;

        Self::validate_bundle(vectorizer.as_ref(), &classifier)?;
        info!(
            "Artifact bundle validated: {} vectorizer, {} classifier, {} features",
            vectorizer.kind(),
            classifier.kind(),
            vectorizer.n_features()
        );

        Ok(InferenceService {
            vectorizer,
            classifier,
            vectorizer_path: self.vectorizer_path,
            classifier_path: self.classifier_path,
        })
    }

    /// The label convention is fixed at training time: the artifacts must
    /// order their classes as [ham, spam] = [0, 1].
    fn validate_bundle(
        vectorizer: &dyn Vectorizer,
        classifier: &ClassifierCapability,
    ) -> Result<(), ArtifactLoadError> {
        if vectorizer.n_features() != classifier.n_features() {
            error!(
                "Vectorizer produces {} features but classifier expects {}",
                vectorizer.n_features(),
                classifier.n_features()
            );
            return Err(ArtifactLoadError::DimensionMismatch {
                vectorizer: vectorizer.n_features(),
                classifier: classifier.n_features(),
            });
        }
        if classifier.classes() != [HAM_LABEL, SPAM_LABEL] {
            error!("Classifier classes {:?} break the ham=0/spam=1 convention", classifier.classes());
            return Err(ArtifactLoadError::LabelConvention(classifier.classes().to_vec()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::classifier::model::{LinearSvc, LogisticRegression};
    use crate::classifier::vectorizer::VectorizerArtifact;

    fn vectorizer(n: usize) -> TextVectorizer {
        let vocabulary: HashMap<String, usize> = (0..n).map(|i| (format!("term{}", i), i)).collect();
        TextVectorizer::from_artifact(VectorizerArtifact::count(vocabulary)).unwrap()
    }

    #[test]
    fn test_missing_artifacts() {
        assert!(matches!(
            InferenceServiceBuilder::new().build(),
            Err(ArtifactLoadError::BuildError(_))
        ));
        assert!(matches!(
            InferenceServiceBuilder::new().with_vectorizer(vectorizer(2)).build(),
            Err(ArtifactLoadError::BuildError(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let classifier = LogisticRegression::new(&[0, 1], vec![1.0, 1.0, 1.0], 0.0).unwrap();
        let result = InferenceServiceBuilder::new()
            .with_vectorizer(vectorizer(2))
            .with_classifier(ClassifierCapability::probabilistic(classifier))
            .build();
        assert!(matches!(
            result,
            Err(ArtifactLoadError::DimensionMismatch { vectorizer: 2, classifier: 3 })
        ));
    }

    #[test]
    fn test_label_convention_safeguard() {
        for classes in [[1, 0], [-1, 1], [0, 2]] {
            let classifier = LinearSvc::new(&classes, vec![1.0, 1.0], 0.0).unwrap();
            let result = InferenceServiceBuilder::new()
                .with_vectorizer(vectorizer(2))
                .with_classifier(ClassifierCapability::label_only(classifier))
                .build();
            assert!(matches!(result, Err(ArtifactLoadError::LabelConvention(_))));
        }
    }

    #[test]
    fn test_missing_files() {
        let result = InferenceServiceBuilder::new().with_vectorizer_file("/nonexistent/vectorizer.json");
        assert!(matches!(result, Err(ArtifactLoadError::NotFound(_))));
        let result = InferenceServiceBuilder::new().with_classifier_file("/nonexistent/classifier.json");
        assert!(matches!(result, Err(ArtifactLoadError::NotFound(_))));
    }

    #[test]
    fn test_compatible_bundle_builds() {
        let classifier = LinearSvc::new(&[0, 1], vec![1.0, -1.0], 0.0).unwrap();
        let service = InferenceServiceBuilder::new()
            .with_vectorizer(vectorizer(2))
            .with_classifier(ClassifierCapability::label_only(classifier))
            .build()
            .unwrap();
        let info = service.info();
        assert_eq!(info.classifier_kind, "linear_svc");
        assert_eq!(info.vectorizer_kind, "count");
    }
}
