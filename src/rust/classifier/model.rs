use std::path::{Path, PathBuf};
use ndarray::{Array1, Array2};
use serde::Deserialize;
use log::info;

use super::error::{ArtifactLoadError, ClassifierError};
#[cfg(feature = "onnx")]
use super::onnx::OnnxClassifier;
use super::utils::{read_json_artifact, sigmoid, softmax};
use crate::runtime::RuntimeConfig;

const ARTIFACT: &str = "classifier";

/// A fitted binary classifier that can only report a label.
pub trait LabelOnlyClassifier: Send + Sync {
    /// Predicts the raw class label for one feature vector
    fn predict(&self, features: &Array1<f64>) -> Result<i64, ClassifierError>;

    /// Class labels in the order probabilities are reported
    fn classes(&self) -> &[i64];

    /// Width of the feature vectors the model was fitted on
    fn n_features(&self) -> usize;

    /// Short name used in logs and `ServiceInfo`
    fn kind(&self) -> &str {
        "custom"
    }
}

/// A fitted binary classifier that also exposes calibrated class probabilities.
pub trait ProbabilisticClassifier: LabelOnlyClassifier {
    /// Probability of each class, in `classes()` order
    fn predict_proba(&self, features: &Array1<f64>) -> Result<Vec<f64>, ClassifierError>;

    /// Label and probabilities together. Models that produce both from one
    /// evaluation should override this.
    fn predict_with_proba(&self, features: &Array1<f64>) -> Result<(i64, Vec<f64>), ClassifierError> {
        Ok((self.predict(features)?, self.predict_proba(features)?))
    }
}

/// What a loaded classifier is able to report.
///
/// The service branches on this instead of probing for probability support at
/// call time.
pub enum ClassifierCapability {
    Probabilistic(Box<dyn ProbabilisticClassifier>),
    LabelOnly(Box<dyn LabelOnlyClassifier>),
}

impl ClassifierCapability {
    pub fn probabilistic(model: impl ProbabilisticClassifier + 'static) -> Self {
        Self::Probabilistic(Box::new(model))
    }

    pub fn label_only(model: impl LabelOnlyClassifier + 'static) -> Self {
        Self::LabelOnly(Box::new(model))
    }

    pub fn supports_probabilities(&self) -> bool {
        matches!(self, Self::Probabilistic(_))
    }

    pub fn predict(&self, features: &Array1<f64>) -> Result<i64, ClassifierError> {
        match self {
            Self::Probabilistic(model) => model.predict(features),
            Self::LabelOnly(model) => model.predict(features),
        }
    }

    pub fn classes(&self) -> &[i64] {
        match self {
            Self::Probabilistic(model) => model.classes(),
            Self::LabelOnly(model) => model.classes(),
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Self::Probabilistic(model) => model.n_features(),
            Self::LabelOnly(model) => model.n_features(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Probabilistic(model) => model.kind(),
            Self::LabelOnly(model) => model.kind(),
        }
    }
}

impl std::fmt::Debug for ClassifierCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Self::Probabilistic(_) => "Probabilistic",
            Self::LabelOnly(_) => "LabelOnly",
        };
        f.debug_struct(variant)
            .field("kind", &self.kind())
            .field("classes", &self.classes())
            .field("n_features", &self.n_features())
            .finish()
    }
}

fn default_label_output() -> String {
    "label".to_string()
}

fn default_probability_output() -> Option<String> {
    Some("probabilities".to_string())
}

/// On-disk description of a fitted classifier, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ClassifierArtifact {
    LogisticRegression {
        classes: Vec<i64>,
        coef: Vec<f64>,
        intercept: f64,
    },
    LinearSvc {
        classes: Vec<i64>,
        coef: Vec<f64>,
        intercept: f64,
    },
    MultinomialNb {
        classes: Vec<i64>,
        class_log_prior: Vec<f64>,
        feature_log_prob: Vec<Vec<f64>>,
    },
    Onnx {
        classes: Vec<i64>,
        model_path: PathBuf,
        n_features: usize,
        #[serde(default = "default_label_output")]
        label_output: String,
        #[serde(default = "default_probability_output")]
        probability_output: Option<String>,
    },
}

fn invalid(reason: impl Into<String>) -> ArtifactLoadError {
    ArtifactLoadError::Invalid {
        artifact: ARTIFACT,
        reason: reason.into(),
    }
}

fn check_binary_classes(classes: &[i64]) -> Result<[i64; 2], ArtifactLoadError> {
    match classes {
        [first, second] if first != second => Ok([*first, *second]),
        _ => Err(invalid(format!("expected exactly two distinct classes, found {:?}", classes))),
    }
}

fn check_finite(values: &[f64], what: &str) -> Result<(), ArtifactLoadError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(pos) => Err(invalid(format!("{} entry {} is not finite", what, pos))),
        None => Ok(()),
    }
}

/// Shared decision function of the linear models.
#[derive(Debug, Clone)]
pub struct LinearModel {
    classes: [i64; 2],
    coef: Array1<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn new(classes: &[i64], coef: Vec<f64>, intercept: f64) -> Result<Self, ArtifactLoadError> {
        let classes = check_binary_classes(classes)?;
        if coef.is_empty() {
            return Err(invalid("coef is empty"));
        }
        check_finite(&coef, "coef")?;
        if !intercept.is_finite() {
            return Err(invalid("intercept is not finite"));
        }
        Ok(Self {
            classes,
            coef: Array1::from(coef),
            intercept,
        })
    }

    /// Signed distance to the separating hyperplane; positive favors `classes[1]`.
    pub fn decision_function(&self, features: &Array1<f64>) -> Result<f64, ClassifierError> {
        if features.len() != self.coef.len() {
            return Err(ClassifierError::PredictionError(format!(
                "expected {} features, got {}",
                self.coef.len(),
                features.len()
            )));
        }
        Ok(self.coef.dot(features) + self.intercept)
    }

    fn predict_label(&self, features: &Array1<f64>) -> Result<i64, ClassifierError> {
        let decision = self.decision_function(features)?;
        Ok(if decision > 0.0 { self.classes[1] } else { self.classes[0] })
    }
}

/// Binary logistic regression. Probabilities are the sigmoid of the decision.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    linear: LinearModel,
}

impl LogisticRegression {
    pub fn new(classes: &[i64], coef: Vec<f64>, intercept: f64) -> Result<Self, ArtifactLoadError> {
        Ok(Self { linear: LinearModel::new(classes, coef, intercept)? })
    }
}

impl LabelOnlyClassifier for LogisticRegression {
    fn predict(&self, features: &Array1<f64>) -> Result<i64, ClassifierError> {
        self.linear.predict_label(features)
    }

    fn classes(&self) -> &[i64] {
        &self.linear.classes
    }

    fn n_features(&self) -> usize {
        self.linear.coef.len()
    }

    fn kind(&self) -> &str {
        "logistic_regression"
    }
}

impl ProbabilisticClassifier for LogisticRegression {
    fn predict_proba(&self, features: &Array1<f64>) -> Result<Vec<f64>, ClassifierError> {
        let positive = sigmoid(self.linear.decision_function(features)?);
        Ok(vec![1.0 - positive, positive])
    }
}

/// Linear support vector classifier. Reports labels only.
#[derive(Debug, Clone)]
pub struct LinearSvc {
    linear: LinearModel,
}

impl LinearSvc {
    pub fn new(classes: &[i64], coef: Vec<f64>, intercept: f64) -> Result<Self, ArtifactLoadError> {
        Ok(Self { linear: LinearModel::new(classes, coef, intercept)? })
    }
}

impl LabelOnlyClassifier for LinearSvc {
    fn predict(&self, features: &Array1<f64>) -> Result<i64, ClassifierError> {
        self.linear.predict_label(features)
    }

    fn classes(&self) -> &[i64] {
        &self.linear.classes
    }

    fn n_features(&self) -> usize {
        self.linear.coef.len()
    }

    fn kind(&self) -> &str {
        "linear_svc"
    }
}

/// Multinomial naive Bayes over term weights.
#[derive(Debug, Clone)]
pub struct MultinomialNb {
    classes: [i64; 2],
    class_log_prior: Array1<f64>,
    feature_log_prob: Array2<f64>,
}

impl MultinomialNb {
    pub fn new(
        classes: &[i64],
        class_log_prior: Vec<f64>,
        feature_log_prob: Vec<Vec<f64>>,
    ) -> Result<Self, ArtifactLoadError> {
        let classes = check_binary_classes(classes)?;
        if class_log_prior.len() != 2 {
            return Err(invalid(format!(
                "class_log_prior must have 2 entries, found {}",
                class_log_prior.len()
            )));
        }
        check_finite(&class_log_prior, "class_log_prior")?;
        if feature_log_prob.len() != 2 {
            return Err(invalid(format!(
                "feature_log_prob must have 2 rows, found {}",
                feature_log_prob.len()
            )));
        }
        let n_features = feature_log_prob[0].len();
        if n_features == 0 || feature_log_prob[1].len() != n_features {
            return Err(invalid("feature_log_prob rows must be non-empty and of equal length"));
        }
        let flat: Vec<f64> = feature_log_prob.into_iter().flatten().collect();
        check_finite(&flat, "feature_log_prob")?;
        let feature_log_prob = Array2::from_shape_vec((2, n_features), flat)
            .map_err(|e| invalid(format!("feature_log_prob has a bad shape: {}", e)))?;

        Ok(Self {
            classes,
            class_log_prior: Array1::from(class_log_prior),
            feature_log_prob,
        })
    }

    fn joint_log_likelihood(&self, features: &Array1<f64>) -> Result<Vec<f64>, ClassifierError> {
        if features.len() != self.feature_log_prob.ncols() {
            return Err(ClassifierError::PredictionError(format!(
                "expected {} features, got {}",
                self.feature_log_prob.ncols(),
                features.len()
            )));
        }
        let jll = self.feature_log_prob.dot(features) + &self.class_log_prior;
        Ok(jll.to_vec())
    }
}

impl LabelOnlyClassifier for MultinomialNb {
    fn predict(&self, features: &Array1<f64>) -> Result<i64, ClassifierError> {
        let jll = self.joint_log_likelihood(features)?;
        // ties go to the first class
        Ok(if jll[1] > jll[0] { self.classes[1] } else { self.classes[0] })
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.feature_log_prob.ncols()
    }

    fn kind(&self) -> &str {
        "multinomial_nb"
    }
}

impl ProbabilisticClassifier for MultinomialNb {
    fn predict_proba(&self, features: &Array1<f64>) -> Result<Vec<f64>, ClassifierError> {
        Ok(softmax(&self.joint_log_likelihood(features)?))
    }
}

/// Loads a classifier artifact and wraps it in the capability it supports.
///
/// Relative ONNX model paths are resolved against the artifact's directory.
pub fn load_classifier(
    path: impl AsRef<Path>,
    runtime_config: &RuntimeConfig,
) -> Result<ClassifierCapability, ArtifactLoadError> {
    let path = path.as_ref();
    let artifact: ClassifierArtifact = read_json_artifact(path, ARTIFACT)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let capability = from_artifact(artifact, base_dir, runtime_config)?;
    info!(
        "Loaded {} classifier from {:?} (probabilities: {})",
        capability.kind(),
        path,
        capability.supports_probabilities()
    );
    Ok(capability)
}

/// Builds a classifier from an in-memory artifact.
pub fn from_artifact(
    artifact: ClassifierArtifact,
    base_dir: &Path,
    runtime_config: &RuntimeConfig,
) -> Result<ClassifierCapability, ArtifactLoadError> {
    let capability = match artifact {
        ClassifierArtifact::LogisticRegression { classes, coef, intercept } => {
            ClassifierCapability::probabilistic(LogisticRegression::new(&classes, coef, intercept)?)
        }
        ClassifierArtifact::LinearSvc { classes, coef, intercept } => {
            ClassifierCapability::label_only(LinearSvc::new(&classes, coef, intercept)?)
        }
        ClassifierArtifact::MultinomialNb { classes, class_log_prior, feature_log_prob } => {
            ClassifierCapability::probabilistic(MultinomialNb::new(&classes, class_log_prior, feature_log_prob)?)
        }
        ClassifierArtifact::Onnx {
            classes,
            model_path,
            n_features,
            label_output,
            probability_output,
        } => {
            let classes = check_binary_classes(&classes)?;
            let model_path = if model_path.is_relative() {
                base_dir.join(model_path)
            } else {
                model_path
            };
            load_onnx(&model_path, classes, n_features, label_output, probability_output, runtime_config)?
        }
    };
    Ok(capability)
}

#[cfg(feature = "onnx")]
fn load_onnx(
    model_path: &Path,
    classes: [i64; 2],
    n_features: usize,
    label_output: String,
    probability_output: Option<String>,
    runtime_config: &RuntimeConfig,
) -> Result<ClassifierCapability, ArtifactLoadError> {
    let model = OnnxClassifier::from_file(
        model_path,
        classes,
        n_features,
        label_output,
        probability_output,
        runtime_config,
    )?;
    Ok(if model.has_probability_output() {
        ClassifierCapability::probabilistic(model)
    } else {
        ClassifierCapability::label_only(model)
    })
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(
    model_path: &Path,
    _classes: [i64; 2],
    _n_features: usize,
    _label_output: String,
    _probability_output: Option<String>,
    _runtime_config: &RuntimeConfig,
) -> Result<ClassifierCapability, ArtifactLoadError> {
    Err(invalid(format!(
        "{:?} is an ONNX model; rebuild with the `onnx` feature to load it",
        model_path
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_regression() -> Result<(), Box<dyn std::error::Error>> {
        let model = LogisticRegression::new(&[0, 1], vec![2.0, -1.0], 0.0)?;
        let spammy = array![1.0, 0.0];
        assert_eq!(model.predict(&spammy)?, 1);
        let proba = model.predict_proba(&spammy)?;
        assert!((proba[1] - sigmoid(2.0)).abs() < 1e-12);
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-12);

        let hammy = array![0.0, 1.0];
        assert_eq!(model.predict(&hammy)?, 0);
        assert!(model.predict_proba(&hammy)?[0] > 0.5);
        Ok(())
    }

    #[test]
    fn test_zero_decision_predicts_first_class() -> Result<(), Box<dyn std::error::Error>> {
        let model = LinearSvc::new(&[0, 1], vec![1.0], 0.0)?;
        assert_eq!(model.predict(&array![0.0])?, 0);
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch_at_predict() {
        let model = LinearSvc::new(&[0, 1], vec![1.0, 1.0], 0.0).unwrap();
        assert!(matches!(
            model.predict(&array![1.0]),
            Err(ClassifierError::PredictionError(_))
        ));
    }

    #[test]
    fn test_multinomial_nb() -> Result<(), Box<dyn std::error::Error>> {
        let model = MultinomialNb::new(
            &[0, 1],
            vec![0.5_f64.ln(), 0.5_f64.ln()],
            vec![vec![0.8_f64.ln(), 0.2_f64.ln()], vec![0.2_f64.ln(), 0.8_f64.ln()]],
        )?;
        let features = array![0.0, 1.0];
        assert_eq!(model.predict(&features)?, 1);
        let proba = model.predict_proba(&features)?;
        assert!((proba[1] - 0.8).abs() < 1e-9);
        assert!((proba[0] - 0.2).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(LogisticRegression::new(&[0], vec![1.0], 0.0).is_err());
        assert!(LogisticRegression::new(&[1, 1], vec![1.0], 0.0).is_err());
        assert!(LogisticRegression::new(&[0, 1], vec![], 0.0).is_err());
        assert!(LogisticRegression::new(&[0, 1], vec![f64::NAN], 0.0).is_err());
        assert!(MultinomialNb::new(&[0, 1], vec![0.0], vec![vec![0.0], vec![0.0]]).is_err());
        assert!(MultinomialNb::new(&[0, 1], vec![0.0, 0.0], vec![vec![0.0], vec![0.0, 0.0]]).is_err());
    }

    #[test]
    fn test_artifact_capabilities() -> Result<(), Box<dyn std::error::Error>> {
        let config = RuntimeConfig::default();
        let base = Path::new(".");

        let artifact: ClassifierArtifact = serde_json::from_str(
            r#"{"kind": "logistic_regression", "classes": [0, 1], "coef": [1.0, 2.0], "intercept": 0.5}"#,
        )?;
        let capability = from_artifact(artifact, base, &config)?;
        assert!(capability.supports_probabilities());
        assert_eq!(capability.n_features(), 2);
        assert_eq!(capability.kind(), "logistic_regression");

        let artifact: ClassifierArtifact = serde_json::from_str(
            r#"{"kind": "linear_svc", "classes": [0, 1], "coef": [1.0], "intercept": 0.0}"#,
        )?;
        let capability = from_artifact(artifact, base, &config)?;
        assert!(!capability.supports_probabilities());
        assert_eq!(capability.classes(), &[0, 1]);
        Ok(())
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        for json in [
            r#"{"kind": "logistic_regression", "classes": [0, 1], "coef": [1.0], "intercept": 0.0, "class_weight": "balanced"}"#,
            r#"{"kind": "linear_svc", "classes": [0, 1], "coef": [1.0], "intercept": 0.0, "multi_class": "crammer_singer"}"#,
            r#"{"kind": "multinomial_nb", "classes": [0, 1], "class_log_prior": [0.0, 0.0], "feature_log_prob": [[0.0], [0.0]], "alpha": 1.0}"#,
            r#"{"kind": "onnx", "classes": [0, 1], "model_path": "model.onnx", "n_features": 1, "zipmap": true}"#,
        ] {
            let result: Result<ClassifierArtifact, _> = serde_json::from_str(json);
            assert!(result.is_err(), "accepted {}", json);
        }
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_artifact_needs_feature() -> Result<(), Box<dyn std::error::Error>> {
        let artifact: ClassifierArtifact = serde_json::from_str(
            r#"{"kind": "onnx", "classes": [0, 1], "model_path": "model.onnx", "n_features": 6}"#,
        )?;
        let result = from_artifact(artifact, Path::new("."), &RuntimeConfig::default());
        assert!(matches!(result, Err(ArtifactLoadError::Invalid { .. })));
        Ok(())
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let result: Result<ClassifierArtifact, _> =
            serde_json::from_str(r#"{"kind": "random_forest", "classes": [0, 1]}"#);
        assert!(result.is_err());
    }
}
