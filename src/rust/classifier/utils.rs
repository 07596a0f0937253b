use std::fs;
use std::path::Path;
use ndarray::Array1;
use serde::de::DeserializeOwned;

use super::error::ArtifactLoadError;

pub(crate) fn l2_normalize(vec: &mut Array1<f64>) {
    let norm: f64 = vec.iter().map(|&x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        vec.mapv_inplace(|x| x / norm);
    }
}

pub(crate) fn l1_normalize(vec: &mut Array1<f64>) {
    let norm: f64 = vec.iter().map(|x| x.abs()).sum();
    if norm > 0.0 {
        vec.mapv_inplace(|x| x / norm);
    }
}

/// Numerically stable logistic function.
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Turns joint log-likelihoods into probabilities.
pub(crate) fn softmax(log_values: &[f64]) -> Vec<f64> {
    let max = log_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![1.0 / log_values.len() as f64; log_values.len()];
    }
    let exps: Vec<f64> = log_values.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

pub(crate) fn read_json_artifact<T: DeserializeOwned>(
    path: &Path,
    artifact: &'static str,
) -> Result<T, ArtifactLoadError> {
    if !path.exists() {
        return Err(ArtifactLoadError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactLoadError::Malformed { artifact, source })
}
