use serde::Deserialize;

#[cfg(feature = "onnx")]
use ort::environment::Environment;
#[cfg(feature = "onnx")]
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
#[cfg(feature = "onnx")]
use ort::session::Session;
#[cfg(feature = "onnx")]
use std::sync::OnceLock;

#[cfg(feature = "onnx")]
use crate::classifier::ArtifactLoadError;

#[cfg(feature = "onnx")]
static ENVIRONMENT: OnceLock<Result<Environment, String>> = OnceLock::new();

/// Graph optimization applied when an ONNX classifier is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    Disable,
    Level1,
    Level2,
    #[default]
    Level3,
}

#[cfg(feature = "onnx")]
impl From<OptimizationLevel> for GraphOptimizationLevel {
    fn from(level: OptimizationLevel) -> Self {
        match level {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
            OptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
            OptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        }
    }
}

/// ONNX Runtime settings. Only ONNX classifiers consult these.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 0 lets ONNX Runtime decide
    pub inter_threads: usize,
    /// 0 lets ONNX Runtime decide
    pub intra_threads: usize,
    pub optimization_level: OptimizationLevel,
}

#[cfg(feature = "onnx")]
fn environment() -> Result<&'static Environment, ArtifactLoadError> {
    ENVIRONMENT
        .get_or_init(|| {
            ort::init()
                .with_name("spamdetect")
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| ArtifactLoadError::RuntimeError(e.clone()))
}

/// Initializes the ONNX Runtime environment once per process.
#[cfg(feature = "onnx")]
pub fn ensure_initialized() -> Result<(), ArtifactLoadError> {
    environment().map(|_| ())
}

#[cfg(feature = "onnx")]
pub fn create_session_builder(config: &RuntimeConfig) -> Result<SessionBuilder, ArtifactLoadError> {
    let mut builder = Session::builder(environment()?)?;

    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }
    builder = builder.with_optimization_level(config.optimization_level.into())?;

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "onnx")]
    #[test]
    fn test_environment_initialization() {
        assert!(ensure_initialized().is_ok());
        assert!(ensure_initialized().is_ok()); // Second call should be fine
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_session_builder_config() {
        let config = RuntimeConfig {
            inter_threads: 2,
            intra_threads: 2,
            optimization_level: OptimizationLevel::Level1,
        };
        assert!(create_session_builder(&config).is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"intra_threads": 4, "optimization_level": "level2"}"#).unwrap();
        assert_eq!(config.inter_threads, 0);
        assert_eq!(config.intra_threads, 4);
        assert_eq!(config.optimization_level, OptimizationLevel::Level2);
    }
}
