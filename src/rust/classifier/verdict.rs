use std::fmt;
use serde::Serialize;

use super::error::ClassifierError;

/// Raw classifier output that means "not spam".
pub const HAM_LABEL: i64 = 0;
/// Raw classifier output that means "spam".
pub const SPAM_LABEL: i64 = 1;

/// The two classes a verdict can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpamLabel {
    Ham,
    Spam,
}

impl SpamLabel {
    /// The raw label value this class is encoded as in the artifacts.
    pub fn raw(self) -> i64 {
        match self {
            Self::Ham => HAM_LABEL,
            Self::Spam => SPAM_LABEL,
        }
    }
}

impl TryFrom<i64> for SpamLabel {
    type Error = ClassifierError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            HAM_LABEL => Ok(Self::Ham),
            SPAM_LABEL => Ok(Self::Spam),
            other => Err(ClassifierError::UnknownLabel(other)),
        }
    }
}

impl fmt::Display for SpamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ham => write!(f, "Ham"),
            Self::Spam => write!(f, "Spam"),
        }
    }
}

/// The result of classifying one piece of text.
///
/// Probabilities are percentages and are not clamped; use
/// [`Verdict::display_percentage`] when feeding a bounded indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub label: SpamLabel,
    pub spam_probability: f64,
    pub ham_probability: f64,
}

impl Verdict {
    pub fn is_spam(&self) -> bool {
        self.label == SpamLabel::Spam
    }

    /// Percentage assigned to the predicted class.
    pub fn confidence(&self) -> f64 {
        match self.label {
            SpamLabel::Spam => self.spam_probability,
            SpamLabel::Ham => self.ham_probability,
        }
    }

    /// Predicted-class percentage truncated to an integer and clamped to `0..=100`.
    pub fn display_percentage(&self) -> u8 {
        let value = self.confidence();
        if value.is_nan() {
            return 0;
        }
        value.clamp(0.0, 100.0) as u8
    }
}
