use std::path::Path;
use std::sync::Mutex;
use ndarray::Array1;
use ort::session::Session;
use ort::value::{Tensor, TensorElementType, ValueType};
use log::{error, info};

use super::error::{ArtifactLoadError, ClassifierError};
use super::model::{LabelOnlyClassifier, ProbabilisticClassifier};
use crate::runtime::{create_session_builder, RuntimeConfig};

fn invalid(reason: impl Into<String>) -> ArtifactLoadError {
    ArtifactLoadError::Invalid {
        artifact: "classifier",
        reason: reason.into(),
    }
}

/// A classifier exported to ONNX and executed with ONNX Runtime.
///
/// The graph is expected to:
/// - Accept one float input of shape [batch, n_features]
/// - Emit an int64 label tensor (one element for a single row)
/// - Optionally emit a float probability tensor of shape [batch, 2], in class order
///
/// Converters that wrap probabilities in a sequence of maps must be configured
/// to emit a plain tensor instead.
#[derive(Debug)]
pub struct OnnxClassifier {
    // ONNX Runtime sessions are run one call at a time
    session: Mutex<Session>,
    input_name: String,
    label_output: String,
    probability_output: Option<String>,
    classes: [i64; 2],
    n_features: usize,
}

impl OnnxClassifier {
    /// Loads the graph and checks its input matches `n_features` and that it
    /// declares the outputs named in the artifact.
    ///
    /// A declared probability output the graph does not have is dropped with a
    /// log line, leaving a label-only classifier.
    pub fn from_file(
        model_path: &Path,
        classes: [i64; 2],
        n_features: usize,
        label_output: String,
        probability_output: Option<String>,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, ArtifactLoadError> {
        if !model_path.exists() {
            return Err(ArtifactLoadError::NotFound(model_path.to_path_buf()));
        }
        if n_features == 0 {
            return Err(invalid("n_features must be positive"));
        }

        let session = create_session_builder(runtime_config)?
            .commit_from_file(model_path)
            .map_err(|e| {
                error!("Failed to load ONNX classifier from {:?}: {}", model_path, e);
                ArtifactLoadError::from(e)
            })?;

        let input_name = Self::validate_input(&session, n_features)?;
        Self::validate_output(&session, &label_output, TensorElementType::Int64)?
            .ok_or_else(|| invalid(format!("ONNX graph has no '{}' output", label_output)))?;
        let probability_output = match probability_output {
            Some(name) => match Self::validate_output(&session, &name, TensorElementType::Float32)? {
                Some(()) => Some(name),
                None => {
                    info!("ONNX graph has no '{}' output, falling back to label-only predictions", name);
                    None
                }
            },
            None => None,
        };

        info!("ONNX classifier structure validated successfully");
        Ok(Self {
            session: Mutex::new(session),
            input_name,
            label_output,
            probability_output,
            classes,
            n_features,
        })
    }

    pub fn has_probability_output(&self) -> bool {
        self.probability_output.is_some()
    }

    /// Checks the first graph input is a rank-2 float tensor whose last
    /// dimension is `n_features` or dynamic, and returns its name.
    fn validate_input(session: &Session, n_features: usize) -> Result<String, ArtifactLoadError> {
        let input = session
            .inputs()
            .first()
            .ok_or_else(|| invalid("ONNX graph has no inputs"))?;

        match input.dtype() {
            ValueType::Tensor { ty: TensorElementType::Float32, shape, .. } => {
                if shape.len() != 2 {
                    return Err(invalid(format!(
                        "input '{}' has rank {}, expected [batch, {}]",
                        input.name(),
                        shape.len(),
                        n_features
                    )));
                }
                let width = shape[1];
                // -1 marks a dynamic dimension
                if width >= 0 && width as usize != n_features {
                    return Err(invalid(format!(
                        "input '{}' takes {} features but the artifact declares n_features = {}",
                        input.name(),
                        width,
                        n_features
                    )));
                }
                Ok(input.name().to_string())
            }
            other => Err(invalid(format!(
                "input '{}' must be a float tensor, found {:?}",
                input.name(),
                other
            ))),
        }
    }

    /// `Ok(None)` when the graph has no output called `name`.
    fn validate_output(
        session: &Session,
        name: &str,
        expected: TensorElementType,
    ) -> Result<Option<()>, ArtifactLoadError> {
        let Some(output) = session.outputs().iter().find(|output| output.name() == name) else {
            return Ok(None);
        };
        match output.dtype().tensor_type() {
            Some(ty) if ty == expected => Ok(Some(())),
            _ => Err(invalid(format!(
                "output '{}' must be a {:?} tensor, found {:?}",
                name,
                expected,
                output.dtype()
            ))),
        }
    }

    /// Runs the graph once, reading the probability output only when asked to.
    fn run(&self, features: &Array1<f64>, with_probabilities: bool) -> Result<(i64, Option<Vec<f64>>), ClassifierError> {
        if features.len() != self.n_features {
            return Err(ClassifierError::PredictionError(format!(
                "expected {} features, got {}",
                self.n_features,
                features.len()
            )));
        }

        let data: Vec<f32> = features.iter().map(|&x| x as f32).collect();
        let input = Tensor::from_array((vec![1_i64, self.n_features as i64], data))
            .map_err(|e| ClassifierError::PredictionError(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::PredictionError("ONNX session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| ClassifierError::PredictionError(format!("Failed to run model: {}", e)))?;

        let label = outputs
            .get(self.label_output.as_str())
            .ok_or_else(|| ClassifierError::PredictionError(format!("Model did not return '{}'", self.label_output)))?
            .try_extract_tensor::<i64>()
            .map_err(|e| ClassifierError::PredictionError(format!("Failed to extract label tensor: {}", e)))?
            .1
            .first()
            .copied()
            .ok_or_else(|| ClassifierError::PredictionError("Label tensor is empty".into()))?;

        let probabilities = match self.probability_output.as_deref() {
            Some(name) if with_probabilities => {
                let (_, values) = outputs
                    .get(name)
                    .ok_or_else(|| ClassifierError::PredictionError(format!("Model did not return '{}'", name)))?
                    .try_extract_tensor::<f32>()
                    .map_err(|e| {
                        ClassifierError::PredictionError(format!("Failed to extract probability tensor: {}", e))
                    })?;
                Some(values.iter().map(|&p| p as f64).collect())
            }
            _ => None,
        };
        Ok((label, probabilities))
    }
}

impl LabelOnlyClassifier for OnnxClassifier {
    fn predict(&self, features: &Array1<f64>) -> Result<i64, ClassifierError> {
        Ok(self.run(features, false)?.0)
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn kind(&self) -> &str {
        "onnx"
    }
}

impl ProbabilisticClassifier for OnnxClassifier {
    fn predict_proba(&self, features: &Array1<f64>) -> Result<Vec<f64>, ClassifierError> {
        Ok(self.predict_with_proba(features)?.1)
    }

    fn predict_with_proba(&self, features: &Array1<f64>) -> Result<(i64, Vec<f64>), ClassifierError> {
        match self.run(features, true)? {
            (label, Some(probabilities)) => Ok((label, probabilities)),
            (_, None) => Err(ClassifierError::PredictionError("Model has no probability output".into())),
        }
    }
}
