use contaflow_core::{
    is_usable_code, normalize, Classification, ClassificationMethod, Transaction,
};

use crate::index::KnowledgeIndex;
use crate::model::{ModelError, TextClassifier};

/// Runs the tiers in priority order and stops at the first that yields a
/// usable code:
///
/// 1. declared group + subgroup against the chart of accounts,
/// 2. declared subgroup alone,
/// 3. the text model over `group subgroup description`.
///
/// When nothing applies the result is the `"Falha"` sentinel. A model error
/// is returned as-is and is distinct from that sentinel.
pub fn classify<M: TextClassifier + ?Sized>(
    tx: &Transaction,
    index: &KnowledgeIndex,
    model: &M,
) -> Result<Classification, ModelError> {
    if let Some(classification) = match_rules(tx, index) {
        return Ok(classification);
    }

    let context = normalize(&context_text(tx));
    if context.is_empty() {
        return Ok(Classification::failed());
    }

    let code = model.predict(&context)?;
    let probability = model.predict_proba(&context)?;
    if !(0.0..=1.0).contains(&probability) {
        return Err(ModelError::InvalidProbability(probability));
    }

    if !is_usable_code(&code) {
        return Ok(Classification::failed());
    }

    Ok(Classification::model(code, probability))
}

fn match_rules(tx: &Transaction, index: &KnowledgeIndex) -> Option<Classification> {
    let subgroup = tx.declared_subgroup()?;

    if let Some(group) = tx.declared_group() {
        if let Some(code) = index
            .lookup_by_group_and_subgroup(group, subgroup)
            .filter(|c| is_usable_code(c))
        {
            return Some(Classification::rule(
                code,
                ClassificationMethod::GroupAndSubgroup,
            ));
        }
    }

    index
        .lookup_by_subgroup(subgroup)
        .filter(|c| is_usable_code(c))
        .map(|code| Classification::rule(code, ClassificationMethod::Subgroup))
}

fn context_text(tx: &Transaction) -> String {
    [
        tx.group.as_deref(),
        tx.subgroup.as_deref(),
        tx.description.as_deref(),
    ]
    .map(|field| field.unwrap_or_default())
    .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockClassifier;
    use contaflow_core::{Account, KnowledgeBase, Money};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn index() -> KnowledgeIndex {
        let kb: KnowledgeBase = vec![
            Account::new("301", "Despesas", "Aluguel"),
            Account::new("302", "Despesas", "Energia Elétrica"),
            Account::new("305", "Administrativas", "Aluguel"),
        ]
        .into_iter()
        .collect();
        KnowledgeIndex::build(&kb)
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

    /// Counts calls so tests can assert the model tier was skipped.
    struct CountingClassifier {
        calls: AtomicUsize,
    }

    impl TextClassifier for CountingClassifier {
        fn predict(&self, _text: &str) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("999".to_string())
        }

        fn predict_proba(&self, _text: &str) -> Result<f64, ModelError> {
            Ok(0.5)
        }
    }

    /// Echoes the text it was given as the predicted code.
    struct EchoClassifier;

    impl TextClassifier for EchoClassifier {
        fn predict(&self, text: &str) -> Result<String, ModelError> {
            Ok(text.to_string())
        }

        fn predict_proba(&self, _text: &str) -> Result<f64, ModelError> {
            Ok(0.4)
        }
    }

    #[test]
    fn group_and_subgroup_rule() {
        let model = MockClassifier::new("999", 0.9);
        let c = classify(&tx(Some("Despesas"), Some("Aluguel"), None, -150000), &index(), &model)
            .unwrap();
        assert_eq!(c.code, "301");
        assert_eq!(c.method.label(), "Regra (Grupo+Subgrupo)");
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn subgroup_rule_with_sloppy_input() {
        let model = MockClassifier::new("999", 0.9);
        let c = classify(&tx(None, Some("aluguel "), None, 200000), &index(), &model).unwrap();
        assert_eq!(c.code, "301");
        assert_eq!(c.method.label(), "Regra (Subgrupo)");
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn group_and_subgroup_takes_priority_over_subgroup() {
        // "Aluguel" alone resolves to 301; the pair resolves to 305.
        let model = MockClassifier::new("999", 0.9);
        let c = classify(
            &tx(Some("Administrativas"), Some("Aluguel"), None, -100),
            &index(),
            &model,
        )
        .unwrap();
        assert_eq!(c.code, "305");
        assert_eq!(c.method, ClassificationMethod::GroupAndSubgroup);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn unknown_group_falls_back_to_subgroup() {
        let model = MockClassifier::new("999", 0.9);
        let c = classify(&tx(Some("Outros"), Some("Energia Eletrica"), None, -100), &index(), &model)
            .unwrap();
        assert_eq!(c.code, "302");
        assert_eq!(c.method, ClassificationMethod::Subgroup);
    }

    #[test]
    fn model_fallback() {
        let model = MockClassifier::new("412", 0.83);
        let c = classify(
            &tx(Some("X"), Some("Y"), Some("pagamento de energia"), -30000),
            &index(),
            &model,
        )
        .unwrap();
        assert_eq!(c.code, "412");
        assert_eq!(c.method.label(), "IA (Contexto)");
        assert_eq!(c.confidence, 0.83);
    }

    #[test]
    fn model_receives_normalized_context() {
        let c = classify(
            &tx(None, Some("Tarifa"), Some("PAGAMENTO Boleto "), -100),
            &index(),
            &EchoClassifier,
        )
        .unwrap();
        // Missing group becomes an empty field, hence the leading space is trimmed.
        assert_eq!(c.code, "tarifa pagamento boleto");
    }

    #[test]
    fn everything_missing_yields_sentinel() {
        let model = CountingClassifier { calls: AtomicUsize::new(0) };
        let c = classify(&tx(None, None, None, 0), &index(), &model).unwrap();
        assert_eq!(c.code, "Falha");
        assert_eq!(c.method.label(), "");
        assert_eq!(c.confidence, 0.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn blank_fields_yield_sentinel() {
        let model = MockClassifier::new("412", 0.9);
        let c = classify(&tx(Some(""), Some(""), Some("   "), -100), &index(), &model).unwrap();
        assert_eq!(c, Classification::failed());
    }

    #[test]
    fn rule_hit_skips_model() {
        let model = CountingClassifier { calls: AtomicUsize::new(0) };
        classify(&tx(None, Some("Aluguel"), Some("qualquer"), -100), &index(), &model).unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_code_is_treated_as_miss() {
        let kb: KnowledgeBase = vec![Account::new("0", "Despesas", "Diversos")]
            .into_iter()
            .collect();
        let index = KnowledgeIndex::build(&kb);
        let model = MockClassifier::new("412", 0.6);
        let c = classify(&tx(Some("Despesas"), Some("Diversos"), None, -100), &index, &model)
            .unwrap();
        assert_eq!(c.method, ClassificationMethod::Model);
        assert_eq!(c.code, "412");
    }

    #[test]
    fn falsy_model_code_yields_sentinel() {
        let model = MockClassifier::new("", 0.7);
        let c = classify(&tx(None, None, Some("tarifa"), -100), &index(), &model).unwrap();
        assert_eq!(c, Classification::failed());
    }

    #[test]
    fn model_error_propagates() {
        let model = MockClassifier::failing("artifact corrupted");
        let err = classify(&tx(None, None, Some("tarifa"), -100), &index(), &model).unwrap_err();
        assert!(matches!(err, ModelError::Prediction(_)));
    }

    #[test]
    fn out_of_range_probability_is_an_error() {
        let model = MockClassifier::new("412", 1.5);
        let err = classify(&tx(None, None, Some("tarifa"), -100), &index(), &model).unwrap_err();
        assert!(matches!(err, ModelError::InvalidProbability(_)));
    }

    #[test]
    fn classification_is_idempotent() {
        let model = MockClassifier::new("412", 0.83);
        let index = index();
        let t = tx(Some("X"), Some("Y"), Some("pagamento"), -100);
        let first = classify(&t, &index, &model).unwrap();
        let second = classify(&t, &index, &model).unwrap();
        assert_eq!(first, second);
    }
}
