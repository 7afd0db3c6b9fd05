use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

/// Code assigned when no cascade tier could classify a transaction.
pub const FAILURE_CODE: &str = "Falha";

/// Label used when a code has no entry in the chart of accounts.
pub const NOT_AVAILABLE: &str = "N/A";

/// An incoming cash-flow row, as produced by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: String,
    pub description: Option<String>,
    pub group: Option<String>,
    pub subgroup: Option<String>,
    pub amount: Money,
}

impl Transaction {
    pub fn new(date: &str, description: Option<&str>, amount: Money) -> Self {
        Transaction {
            date: date.to_string(),
            description: description.map(str::to_string),
            group: None,
            subgroup: None,
            amount,
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn with_subgroup(mut self, subgroup: &str) -> Self {
        self.subgroup = Some(subgroup.to_string());
        self
    }

    /// Declared group, if present and non-empty.
    pub fn declared_group(&self) -> Option<&str> {
        present(self.group.as_deref())
    }

    /// Declared subgroup, if present and non-empty.
    pub fn declared_subgroup(&self) -> Option<&str> {
        present(self.subgroup.as_deref())
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationMethod {
    GroupAndSubgroup,
    Subgroup,
    Model,
    Unclassified,
}

impl ClassificationMethod {
    pub fn label(self) -> &'static str {
        match self {
            ClassificationMethod::GroupAndSubgroup => "Regra (Grupo+Subgrupo)",
            ClassificationMethod::Subgroup => "Regra (Subgrupo)",
            ClassificationMethod::Model => "IA (Contexto)",
            ClassificationMethod::Unclassified => "",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Regra (Grupo+Subgrupo)" => Some(ClassificationMethod::GroupAndSubgroup),
            "Regra (Subgrupo)" => Some(ClassificationMethod::Subgroup),
            "IA (Contexto)" => Some(ClassificationMethod::Model),
            "" => Some(ClassificationMethod::Unclassified),
            _ => None,
        }
    }
}

impl fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of the cascade for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub code: String,
    pub method: ClassificationMethod,
    /// 1.0 for rule matches, the model's posterior for the fallback tier.
    pub confidence: f64,
}

impl Classification {
    pub fn rule(code: &str, method: ClassificationMethod) -> Self {
        Classification {
            code: code.to_string(),
            method,
            confidence: 1.0,
        }
    }

    pub fn model(code: String, confidence: f64) -> Self {
        Classification {
            code,
            method: ClassificationMethod::Model,
            confidence,
        }
    }

    pub fn failed() -> Self {
        Classification {
            code: FAILURE_CODE.to_string(),
            method: ClassificationMethod::Unclassified,
            confidence: 0.0,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.method == ClassificationMethod::Unclassified
    }
}

/// A classified transaction, ready for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub date: String,
    pub original_description: Option<String>,
    pub amount: Money,
    pub code: String,
    pub debit: Option<String>,
    pub credit: Option<String>,
    pub group_label: String,
    pub subgroup_label: String,
    pub method: ClassificationMethod,
    pub confidence: f64,
}

impl ClassificationResult {
    pub fn history_record(&self) -> HistoryRecord {
        HistoryRecord {
            date: self.date.clone(),
            original_description: self.original_description.clone(),
            amount: self.amount,
            code: self.code.clone(),
            method: self.method,
            confidence: self.confidence,
        }
    }
}

/// Append-only audit row kept for later curation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: String,
    pub original_description: Option<String>,
    pub amount: Money,
    pub code: String,
    pub method: ClassificationMethod,
    pub confidence: f64,
}
