use std::collections::{HashMap, HashSet};
use std::path::Path;
use ndarray::Array1;
use regex::Regex;
use serde::Deserialize;
use log::{info, warn};

use super::error::{ArtifactLoadError, ClassifierError};
use super::utils::{l1_normalize, l2_normalize, read_json_artifact};

const ARTIFACT: &str = "vectorizer";

/// Default token pattern: runs of two or more word characters.
pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

/// Converts raw text into the fixed-width feature vector a classifier was trained on.
///
/// Implementations must be pure: the same text always yields the same vector,
/// and `transform` never mutates fitted state.
pub trait Vectorizer: Send + Sync {
    /// Transforms one document into a dense feature vector of length `n_features()`
    fn transform(&self, text: &str) -> Result<Array1<f64>, ClassifierError>;

    /// Width of the vectors produced by `transform`
    fn n_features(&self) -> usize;

    /// Short name used in logs and `ServiceInfo`
    fn kind(&self) -> &str {
        "custom"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    #[default]
    Tfidf,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

fn default_true() -> bool {
    true
}

fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.to_string()
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

/// On-disk description of a fitted bag-of-words vectorizer.
///
/// Unknown keys are rejected: an option this crate does not implement, such as
/// a character analyzer, would otherwise be silently replaced by word tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorizerArtifact {
    #[serde(default)]
    pub weighting: Weighting,
    pub vocabulary: HashMap<String, usize>,
    #[serde(default)]
    pub idf: Option<Vec<f64>>,
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub stop_words: Vec<String>,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,
}

impl VectorizerArtifact {
    /// A TF-IDF artifact with default analyzer settings.
    pub fn tfidf(vocabulary: HashMap<String, usize>, idf: Vec<f64>) -> Self {
        Self {
            weighting: Weighting::Tfidf,
            vocabulary,
            idf: Some(idf),
            lowercase: true,
            token_pattern: default_token_pattern(),
            ngram_range: default_ngram_range(),
            stop_words: Vec::new(),
            binary: false,
            sublinear_tf: false,
            norm: default_norm(),
        }
    }

    /// A raw term-count artifact with default analyzer settings.
    pub fn count(vocabulary: HashMap<String, usize>) -> Self {
        Self {
            weighting: Weighting::Count,
            idf: None,
            norm: None,
            ..Self::tfidf(vocabulary, Vec::new())
        }
    }
}

/// A fitted TF-IDF or term-count vectorizer.
#[derive(Debug, Clone)]
pub struct TextVectorizer {
    weighting: Weighting,
    vocabulary: HashMap<String, usize>,
    idf: Option<Array1<f64>>,
    lowercase: bool,
    token_regex: Regex,
    use_capture_group: bool,
    ngram_range: (usize, usize),
    stop_words: HashSet<String>,
    binary: bool,
    sublinear_tf: bool,
    norm: Option<Norm>,
}

fn invalid(reason: impl Into<String>) -> ArtifactLoadError {
    ArtifactLoadError::Invalid {
        artifact: ARTIFACT,
        reason: reason.into(),
    }
}

impl TextVectorizer {
    /// Loads and validates a vectorizer artifact from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ArtifactLoadError> {
        let path = path.as_ref();
        let artifact: VectorizerArtifact = read_json_artifact(path, ARTIFACT)?;
        let vectorizer = Self::from_artifact(artifact)?;
        info!(
            "Loaded {} vectorizer from {:?} ({} features)",
            vectorizer.kind(),
            path,
            vectorizer.n_features()
        );
        Ok(vectorizer)
    }

    /// Validates an in-memory artifact.
    ///
    /// Rejects vocabularies whose columns are not exactly `0..n`, idf vectors of
    /// the wrong length, token patterns with more than one capture group and
    /// empty or inverted n-gram ranges.
    pub fn from_artifact(artifact: VectorizerArtifact) -> Result<Self, ArtifactLoadError> {
        let n_features = artifact.vocabulary.len();
        if n_features == 0 {
            return Err(invalid("vocabulary is empty"));
        }

        let mut seen = vec![false; n_features];
        for (term, &column) in &artifact.vocabulary {
            if column >= n_features {
                return Err(invalid(format!(
                    "term '{}' maps to column {} but the vocabulary has {} terms",
                    term, column, n_features
                )));
            }
            if seen[column] {
                return Err(invalid(format!("column {} is assigned to more than one term", column)));
            }
            seen[column] = true;
        }

        let idf = match artifact.weighting {
            Weighting::Tfidf => {
                let idf = artifact
                    .idf
                    .ok_or_else(|| invalid("tfidf weighting requires an idf vector"))?;
                if idf.len() != n_features {
                    return Err(invalid(format!(
                        "idf has {} entries but the vocabulary has {} terms",
                        idf.len(),
                        n_features
                    )));
                }
                if let Some(pos) = idf.iter().position(|v| !v.is_finite()) {
                    return Err(invalid(format!("idf entry {} is not finite", pos)));
                }
                Some(Array1::from(idf))
            }
            Weighting::Count => {
                if artifact.idf.is_some() {
                    warn!("Ignoring idf vector on a count vectorizer");
                }
                None
            }
        };

        let (min_n, max_n) = artifact.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(invalid(format!("invalid ngram_range ({}, {})", min_n, max_n)));
        }

        let token_regex = Regex::new(&artifact.token_pattern)
            .map_err(|e| invalid(format!("bad token_pattern: {}", e)))?;
        let use_capture_group = match token_regex.captures_len() {
            1 => false,
            2 => true,
            groups => {
                return Err(invalid(format!(
                    "token_pattern may contain at most one capture group, found {}",
                    groups - 1
                )))
            }
        };

        Ok(Self {
            weighting: artifact.weighting,
            vocabulary: artifact.vocabulary,
            idf,
            lowercase: artifact.lowercase,
            token_regex,
            use_capture_group,
            ngram_range: artifact.ngram_range,
            stop_words: artifact.stop_words.into_iter().collect(),
            binary: artifact.binary,
            sublinear_tf: artifact.sublinear_tf,
            norm: artifact.norm,
        })
    }

    fn tokenize<'t>(&self, text: &'t str) -> Vec<&'t str> {
        if self.use_capture_group {
            self.token_regex
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str())
                .collect()
        } else {
            self.token_regex.find_iter(text).map(|m| m.as_str()).collect()
        }
    }

    /// Splits text into the terms the vocabulary is keyed by: tokens with stop
    /// words removed, expanded into space-joined word n-grams.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let lowered;
        let text = if self.lowercase {
            lowered = text.to_lowercase();
            lowered.as_str()
        } else {
            text
        };

        let tokens: Vec<&str> = self
            .tokenize(text)
            .into_iter()
            .filter(|token| !self.stop_words.contains(*token))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n.min(tokens.len()) {
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }
}

impl Vectorizer for TextVectorizer {
    fn transform(&self, text: &str) -> Result<Array1<f64>, ClassifierError> {
        let mut features = Array1::zeros(self.n_features());
        for term in self.analyze(text) {
            if let Some(&column) = self.vocabulary.get(&term) {
                features[column] += 1.0;
            }
        }

        if self.binary {
            features.mapv_inplace(|tf: f64| if tf > 0.0 { 1.0 } else { 0.0 });
        }

        if self.weighting == Weighting::Count {
            return Ok(features);
        }

        if self.sublinear_tf {
            features.mapv_inplace(|tf: f64| if tf > 0.0 { 1.0 + tf.ln() } else { 0.0 });
        }
        if let Some(idf) = &self.idf {
            features *= idf;
        }
        match self.norm {
            Some(Norm::L2) => l2_normalize(&mut features),
            Some(Norm::L1) => l1_normalize(&mut features),
            None => {}
        }
        Ok(features)
    }

    fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    fn kind(&self) -> &str {
        match self.weighting {
            Weighting::Tfidf => "tfidf",
            Weighting::Count => "count",
        }
    }
}
