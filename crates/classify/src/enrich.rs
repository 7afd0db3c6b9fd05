use contaflow_core::{Classification, ClassificationResult, Transaction, FAILURE_CODE, NOT_AVAILABLE};

use crate::index::KnowledgeIndex;

/// Places the code on the debit or credit side and joins back the account
/// labels. Zero amounts land on neither side.
pub fn enrich(
    tx: &Transaction,
    classification: Classification,
    index: &KnowledgeIndex,
) -> ClassificationResult {
    let code = classification.code;

    let debit = tx.amount.is_negative().then(|| code.clone());
    let credit = tx.amount.is_positive().then(|| code.clone());

    let detail = if code == FAILURE_CODE {
        None
    } else {
        index.lookup_detail(&code)
    };
    let (group_label, subgroup_label) = match detail {
        Some(d) => (d.group.clone(), d.subgroup.clone()),
        None => (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()),
    };

    ClassificationResult {
        date: tx.date.clone(),
        original_description: tx.description.clone(),
        amount: tx.amount,
        code,
        debit,
        credit,
        group_label,
        subgroup_label,
        method: classification.method,
        confidence: classification.confidence,
    }
}
