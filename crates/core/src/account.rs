use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of the chart of accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub code: String,
    pub group: String,
    pub subgroup: String,
    pub movement: Option<String>,
}

impl Account {
    pub fn new(code: &str, group: &str, subgroup: &str) -> Self {
        Account {
            code: code.to_string(),
            group: group.to_string(),
            subgroup: subgroup.to_string(),
            movement: None,
        }
    }

    pub fn with_movement(mut self, movement: &str) -> Self {
        self.movement = Some(movement.to_string());
        self
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} / {})", self.code, self.group, self.subgroup)
    }
}

/// Ordered chart of accounts loaded for a single classification run.
/// Order matters: on duplicate keys the earliest account wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    accounts: Vec<Account>,
}

impl KnowledgeBase {
    pub fn new(accounts: Vec<Account>) -> Self {
        KnowledgeBase { accounts }
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Account> {
        self.accounts.iter()
    }
}

impl FromIterator<Account> for KnowledgeBase {
    fn from_iter<I: IntoIterator<Item = Account>>(iter: I) -> Self {
        KnowledgeBase::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a KnowledgeBase {
    type Item = &'a Account;
    type IntoIter = std::slice::Iter<'a, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.iter()
    }
}

/// A description → account code pair the text model learns from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub text: String,
    pub code: String,
}

impl TrainingExample {
    pub fn new(text: &str, code: &str) -> Self {
        TrainingExample {
            text: text.to_string(),
            code: code.to_string(),
        }
    }
}

/// Whether a looked-up code counts as a match. Empty codes and numeric zero
/// (`"0"`, `"0.0"`, `"00"`) are treated as "no match"; a chart of accounts
/// that genuinely uses code 0 cannot be matched by the rule tiers.
pub fn is_usable_code(code: &str) -> bool {
    let code = code.trim();
    if code.is_empty() {
        return false;
    }
    match code.parse::<f64>() {
        Ok(n) => n != 0.0,
        Err(_) => true,
    }
}
