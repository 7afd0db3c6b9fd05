use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model artifact not readable at {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Model artifact at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Model artifact at {path} is inconsistent: {reason}")]
    Inconsistent { path: PathBuf, reason: String },
    #[error("Model has no labels to predict")]
    Untrained,
    #[error("No usable training examples")]
    EmptyTrainingSet,
    #[error("Model returned an out-of-range probability: {0}")]
    InvalidProbability(f64),
    #[error("Prediction failed: {0}")]
    Prediction(String),
}

/// Supervised text → account code predictor, consumed as a black box.
/// Both entry points receive already-normalized text.
pub trait TextClassifier: Send + Sync {
    /// Single best code for the text.
    fn predict(&self, text: &str) -> Result<String, ModelError>;

    /// Maximum posterior probability across all learned codes, in [0, 1].
    fn predict_proba(&self, text: &str) -> Result<f64, ModelError>;
}

impl<T: TextClassifier + ?Sized> TextClassifier for &T {
    fn predict(&self, text: &str) -> Result<String, ModelError> {
        (**self).predict(text)
    }

    fn predict_proba(&self, text: &str) -> Result<f64, ModelError> {
        (**self).predict_proba(text)
    }
}

impl<T: TextClassifier + ?Sized> TextClassifier for Box<T> {
    fn predict(&self, text: &str) -> Result<String, ModelError> {
        (**self).predict(text)
    }

    fn predict_proba(&self, text: &str) -> Result<f64, ModelError> {
        (**self).predict_proba(text)
    }
}

// ── Mock classifier (tests and dry runs) ──────────────────────────────────────

/// Returns a preset code and probability for every input, or a preset error.
pub struct MockClassifier {
    pub code: String,
    pub probability: f64,
    pub fail_with: Option<String>,
}

impl MockClassifier {
    pub fn new(code: impl Into<String>, probability: f64) -> Self {
        Self {
            code: code.into(),
            probability,
            fail_with: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            code: String::new(),
            probability: 0.0,
            fail_with: Some(message.into()),
        }
    }
}

impl TextClassifier for MockClassifier {
    fn predict(&self, _text: &str) -> Result<String, ModelError> {
        match &self.fail_with {
            Some(message) => Err(ModelError::Prediction(message.clone())),
            None => Ok(self.code.clone()),
        }
    }

    fn predict_proba(&self, _text: &str) -> Result<f64, ModelError> {
        match &self.fail_with {
            Some(message) => Err(ModelError::Prediction(message.clone())),
            None => Ok(self.probability),
        }
    }
}
