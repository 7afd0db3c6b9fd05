use std::collections::{BTreeMap, BTreeSet};

use contaflow_core::{
    Classification, ClassificationMethod, ClassificationResult, KnowledgeBase, Transaction,
};

use crate::cascade;
use crate::enrich::enrich;
use crate::index::KnowledgeIndex;
use crate::model::{ModelError, TextClassifier};

/// Owns the index and model for one run. Both are read-only while it lives,
/// so classifying a row never depends on any other row.
pub struct ClassificationEngine<M: TextClassifier> {
    index: KnowledgeIndex,
    model: M,
}

impl<M: TextClassifier> ClassificationEngine<M> {
    pub fn new(knowledge_base: &KnowledgeBase, model: M) -> Self {
        let index = KnowledgeIndex::build(knowledge_base);
        tracing::debug!(
            accounts = index.account_count(),
            subgroups = index.subgroup_count(),
            "knowledge index built"
        );
        Self { index, model }
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    pub fn classify(&self, tx: &Transaction) -> Result<Classification, ModelError> {
        cascade::classify(tx, &self.index, &self.model)
    }

    /// Classifies and enriches every row, preserving input order. The first
    /// model failure aborts the whole batch.
    pub fn classify_all(
        &self,
        transactions: &[Transaction],
    ) -> Result<Vec<ClassificationResult>, ModelError> {
        let results = transactions
            .iter()
            .map(|tx| {
                let classification = self.classify(tx)?;
                Ok(enrich(tx, classification, &self.index))
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        for subgroup in unmatched_subgroups(transactions, &results) {
            tracing::warn!(%subgroup, "declared subgroup not found in chart of accounts");
        }
        Ok(results)
    }
}

/// Declared subgroups of rows that no rule tier classified, deduplicated.
pub fn unmatched_subgroups(
    transactions: &[Transaction],
    results: &[ClassificationResult],
) -> BTreeSet<String> {
    transactions
        .iter()
        .zip(results)
        .filter(|(_, r)| {
            !matches!(
                r.method,
                ClassificationMethod::GroupAndSubgroup | ClassificationMethod::Subgroup
            )
        })
        .filter_map(|(tx, _)| tx.declared_subgroup())
        .map(|s| s.trim().to_string())
        .collect()
}

/// Per-run counters reported once classification finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub by_method: BTreeMap<&'static str, usize>,
    pub failures: usize,
    /// Model-classified rows whose confidence is below the review threshold.
    pub needs_review: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ClassificationResult], review_threshold: f64) -> Self {
        let mut summary = RunSummary {
            total: results.len(),
            ..Default::default()
        };
        for r in results {
            match r.method {
                ClassificationMethod::Unclassified => summary.failures += 1,
                method => *summary.by_method.entry(method.label()).or_insert(0) += 1,
            }
            if r.method == ClassificationMethod::Model && r.confidence < review_threshold {
                summary.needs_review += 1;
            }
        }
        summary
    }

    pub fn count(&self, method: ClassificationMethod) -> usize {
        match method {
            ClassificationMethod::Unclassified => self.failures,
            m => self.by_method.get(m.label()).copied().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockClassifier;
    use contaflow_core::{Account, Money};

    fn kb() -> KnowledgeBase {
        vec![
            Account::new("301", "Despesas", "Aluguel"),
            Account::new("412", "Despesas", "Energia"),
        ]
        .into_iter()
        .collect()
    }

    fn tx(group: Option<&str>, subgroup: Option<&str>, desc: Option<&str>, cents: i64) -> Transaction {
        Transaction {
            date: "2024-03-01".to_string(),
            description: desc.map(str::to_string),
            group: group.map(str::to_string),
            subgroup: subgroup.map(str::to_string),
            amount: Money::from_cents(cents),
        }
    }

    #[test]
    fn scenario_group_and_subgroup() {
        let engine = ClassificationEngine::new(&kb(), MockClassifier::new("999", 0.9));
        let r = &engine
            .classify_all(&[tx(Some("Despesas"), Some("Aluguel"), None, -150000)])
            .unwrap()[0];
        assert_eq!(r.code, "301");
        assert_eq!(r.method.label(), "Regra (Grupo+Subgrupo)");
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.debit.as_deref(), Some("301"));
        assert_eq!(r.credit, None);
    }

    #[test]
    fn scenario_subgroup_only() {
        let engine = ClassificationEngine::new(&kb(), MockClassifier::new("999", 0.9));
        let r = &engine
            .classify_all(&[tx(None, Some("aluguel "), None, 200000)])
            .unwrap()[0];
        assert_eq!(r.code, "301");
        assert_eq!(r.method.label(), "Regra (Subgrupo)");
        assert_eq!(r.credit.as_deref(), Some("301"));
        assert_eq!(r.debit, None);
    }

    #[test]
    fn scenario_model_fallback_enriches_labels() {
        let engine = ClassificationEngine::new(&kb(), MockClassifier::new("412", 0.83));
        let r = &engine
            .classify_all(&[tx(Some("X"), Some("Y"), Some("pagamento de energia"), -30000)])
            .unwrap()[0];
        assert_eq!(r.code, "412");
        assert_eq!(r.method.label(), "IA (Contexto)");
        assert_eq!(r.confidence, 0.83);
        assert_eq!(r.subgroup_label, "Energia");
        assert_eq!(r.debit.as_deref(), Some("412"));
    }

    #[test]
    fn scenario_nothing_to_go_on() {
        let engine = ClassificationEngine::new(&kb(), MockClassifier::new("412", 0.83));
        let r = &engine.classify_all(&[tx(None, None, None, 0)]).unwrap()[0];
        assert_eq!(r.code, "Falha");
        assert_eq!(r.method.label(), "");
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.debit, None);
        assert_eq!(r.credit, None);
        assert_eq!(r.group_label, "N/A");
    }

    #[test]
    fn output_order_matches_input_order() {
        let engine = ClassificationEngine::new(&kb(), MockClassifier::new("999", 0.4));
        let input = vec![
            tx(None, Some("Energia"), None, -1),
            tx(None, None, Some("desconhecido"), -2),
            tx(None, Some("Aluguel"), None, -3),
        ];
        let results = engine.classify_all(&input).unwrap();
        let codes: Vec<&str> = results.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["412", "999", "301"]);
        let amounts: Vec<Money> = results.iter().map(|r| r.amount).collect();
        assert_eq!(
            amounts,
            vec![Money::from_cents(-1), Money::from_cents(-2), Money::from_cents(-3)]
        );
    }

    #[test]
    fn model_failure_aborts_batch() {
        let engine = ClassificationEngine::new(&kb(), MockClassifier::failing("corrupted"));
        let input = vec![
            tx(None, Some("Aluguel"), None, -1),
            tx(None, None, Some("tarifa"), -2),
        ];
        assert!(engine.classify_all(&input).is_err());
    }

    #[test]
    fn unmatched_declared_subgroups_are_collected_once() {
        let engine = ClassificationEngine::new(&kb(), MockClassifier::new("999", 0.9));
        let input = vec![
            tx(None, Some("Aluguel"), None, -1),
            tx(Some("X"), Some("Seguros"), Some("apolice"), -1),
            tx(None, Some("Seguros "), None, -1),
            tx(None, None, Some("tarifa"), -1),
        ];
        let results = engine.classify_all(&input).unwrap();
        let unmatched = unmatched_subgroups(&input, &results);
        assert_eq!(unmatched.into_iter().collect::<Vec<_>>(), vec!["Seguros"]);
    }

    #[test]
    fn summary_counts_methods_and_reviews() {
        let engine = ClassificationEngine::new(&kb(), MockClassifier::new("999", 0.55));
        let input = vec![
            tx(Some("Despesas"), Some("Aluguel"), None, -1),
            tx(None, Some("Energia"), None, -1),
            tx(None, None, Some("desconhecido"), -1),
            tx(None, None, None, 0),
        ];
        let results = engine.classify_all(&input).unwrap();
        let summary = RunSummary::from_results(&results, 0.70);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.count(ClassificationMethod::GroupAndSubgroup), 1);
        assert_eq!(summary.count(ClassificationMethod::Subgroup), 1);
        assert_eq!(summary.count(ClassificationMethod::Model), 1);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.needs_review, 1);
    }
}
