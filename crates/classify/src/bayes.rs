//! Multinomial Naive Bayes over word unigrams and bigrams.
//!
//! The trainer learns from curated description → code pairs plus one implicit
//! example per account (its subgroup name), so every known account can be
//! predicted even without curated data.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use contaflow_core::{normalize, KnowledgeBase, TrainingExample};

use crate::model::{ModelError, TextClassifier};

const SMOOTHING: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    /// Sorted account codes; index order is also the tie-break order.
    labels: Vec<String>,
    vocabulary: BTreeMap<String, usize>,
    /// `feature_log_probs[label][feature]`
    feature_log_probs: Vec<Vec<f64>>,
    /// Uniform prior, stored so the artifact is self-describing.
    log_prior: f64,
}

/// Builds the full training set: curated examples first, then each account's
/// subgroup as an implicit example for its code.
pub fn training_set(
    knowledge_base: &KnowledgeBase,
    curated: &[TrainingExample],
) -> Vec<TrainingExample> {
    curated
        .iter()
        .cloned()
        .chain(
            knowledge_base
                .iter()
                .map(|a| TrainingExample::new(&a.subgroup, &a.code)),
        )
        .filter(|ex| !ex.text.trim().is_empty() && !ex.code.trim().is_empty())
        .collect()
}

impl NaiveBayesModel {
    pub fn train(examples: &[TrainingExample]) -> Result<Self, ModelError> {
        let documents: Vec<(Vec<String>, &str)> = examples
            .iter()
            .map(|ex| (tokens(&normalize(&ex.text)), ex.code.trim()))
            .filter(|(toks, code)| !toks.is_empty() && !code.is_empty())
            .collect();

        if documents.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let labels: Vec<String> = documents
            .iter()
            .map(|(_, code)| code.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let label_index: HashMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let mut vocabulary = BTreeMap::new();
        for (toks, _) in &documents {
            for t in toks {
                let next = vocabulary.len();
                vocabulary.entry(t.clone()).or_insert(next);
            }
        }

        let mut counts = vec![vec![0.0_f64; vocabulary.len()]; labels.len()];
        for (toks, code) in &documents {
            let row = &mut counts[label_index[code]];
            for t in toks {
                row[vocabulary[t]] += 1.0;
            }
        }

        let vocab_size = vocabulary.len() as f64;
        let feature_log_probs = counts
            .into_iter()
            .map(|row| {
                let total: f64 = row.iter().sum();
                let denom = (total + SMOOTHING * vocab_size).ln();
                row.into_iter()
                    .map(|c| (c + SMOOTHING).ln() - denom)
                    .collect()
            })
            .collect();

        Ok(NaiveBayesModel {
            log_prior: -(labels.len() as f64).ln(),
            labels,
            vocabulary,
            feature_log_probs,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Artifact {
            path: path.to_path_buf(),
            source,
        })?;
        let model: NaiveBayesModel =
            serde_json::from_str(&content).map_err(|source| ModelError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        if model.labels.is_empty() {
            return Err(ModelError::Untrained);
        }
        model
            .check_shape()
            .map_err(|reason| ModelError::Inconsistent {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(model)
    }

    /// Every label owns one row and every row covers the whole vocabulary.
    fn check_shape(&self) -> Result<(), String> {
        if self.feature_log_probs.len() != self.labels.len() {
            return Err(format!(
                "{} probability rows for {} labels",
                self.feature_log_probs.len(),
                self.labels.len()
            ));
        }
        let width = self.vocabulary.len();
        if let Some(row) = self.feature_log_probs.iter().find(|r| r.len() != width) {
            return Err(format!(
                "probability row has {} features, vocabulary has {width}",
                row.len()
            ));
        }
        if let Some((token, i)) = self.vocabulary.iter().find(|(_, i)| **i >= width) {
            return Err(format!("token '{token}' points at feature {i} of {width}"));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let json = serde_json::to_string(self).map_err(|source| ModelError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ModelError::Artifact {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Posterior probability of every label, in label order.
    pub fn posteriors(&self, text: &str) -> Result<Vec<f64>, ModelError> {
        if self.labels.is_empty() {
            return Err(ModelError::Untrained);
        }

        let features: Vec<usize> = tokens(text)
            .iter()
            .filter_map(|t| self.vocabulary.get(t).copied())
            .collect();

        let joint: Vec<f64> = self
            .feature_log_probs
            .iter()
            .map(|row| self.log_prior + features.iter().map(|&f| row[f]).sum::<f64>())
            .collect();

        let max = joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = joint.iter().map(|j| (j - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        Ok(exp.into_iter().map(|e| e / total).collect())
    }

    fn best(&self, text: &str) -> Result<(usize, f64), ModelError> {
        let posteriors = self.posteriors(text)?;
        let mut best = (0, posteriors[0]);
        for (i, &p) in posteriors.iter().enumerate().skip(1) {
            if p > best.1 {
                best = (i, p);
            }
        }
        Ok(best)
    }
}

impl TextClassifier for NaiveBayesModel {
    fn predict(&self, text: &str) -> Result<String, ModelError> {
        let (i, _) = self.best(text)?;
        Ok(self.labels[i].clone())
    }

    fn predict_proba(&self, text: &str) -> Result<f64, ModelError> {
        let (_, p) = self.best(text)?;
        Ok(p.clamp(0.0, 1.0))
    }
}

/// Word unigrams followed by adjacent-word bigrams.
fn tokens(text: &str) -> Vec<String> {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let bigrams = words.windows(2).map(|w| format!("{} {}", w[0], w[1]));
    words.iter().map(|w| w.to_string()).chain(bigrams).collect()
}
