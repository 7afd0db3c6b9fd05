use std::collections::HashMap;

use contaflow_core::{normalize, KnowledgeBase};

/// Group/subgroup labels of an account, looked up by code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDetail {
    pub group: String,
    pub subgroup: String,
}

/// Immutable lookup tables over a chart of accounts. Rebuild it whenever the
/// underlying knowledge base changes.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeIndex {
    by_group_and_subgroup: HashMap<String, String>,
    by_subgroup: HashMap<String, String>,
    details: HashMap<String, AccountDetail>,
}

impl KnowledgeIndex {
    /// Single ordered pass; a key already present is never overwritten, so
    /// the earliest account wins on duplicates.
    pub fn build(knowledge_base: &KnowledgeBase) -> Self {
        let mut index = KnowledgeIndex::default();

        for account in knowledge_base {
            if account.code.is_empty() {
                continue;
            }

            index
                .details
                .entry(account.code.clone())
                .or_insert_with(|| AccountDetail {
                    group: account.group.clone(),
                    subgroup: account.subgroup.clone(),
                });

            let subgroup = normalize(&account.subgroup);
            if subgroup.is_empty() {
                continue;
            }

            index
                .by_group_and_subgroup
                .entry(pair_key(&normalize(&account.group), &subgroup))
                .or_insert_with(|| account.code.clone());
            index
                .by_subgroup
                .entry(subgroup)
                .or_insert_with(|| account.code.clone());
        }

        index
    }

    pub fn lookup_by_group_and_subgroup(&self, group: &str, subgroup: &str) -> Option<&str> {
        self.by_group_and_subgroup
            .get(&pair_key(&normalize(group), &normalize(subgroup)))
            .map(String::as_str)
    }

    pub fn lookup_by_subgroup(&self, subgroup: &str) -> Option<&str> {
        self.by_subgroup
            .get(&normalize(subgroup))
            .map(String::as_str)
    }

    /// Exact, non-normalized code equality.
    pub fn lookup_detail(&self, code: &str) -> Option<&AccountDetail> {
        self.details.get(code)
    }

    pub fn subgroup_count(&self) -> usize {
        self.by_subgroup.len()
    }

    pub fn account_count(&self) -> usize {
        self.details.len()
    }
}

fn pair_key(group: &str, subgroup: &str) -> String {
    format!("{group}|{subgroup}")
}
