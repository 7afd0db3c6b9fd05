use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid amount: '{0}'")]
pub struct AmountError(pub String);

/// Signed cash-flow amount. Negative values leave the account (debit side),
/// positive values enter it (credit side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .unwrap_or_default()
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Parses either a plain decimal (`-1500.00`) or a Brazilian-formatted
    /// value (`R$ -1.500,00`). Accounting parentheses mark a negative amount.
    pub fn parse(raw: &str) -> Result<Self, AmountError> {
        let s = raw.trim();
        let (negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
            (true, &s[1..s.len() - 1])
        } else {
            (false, s)
        };
        let s: String = s
            .replace("R$", "")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if s.is_empty() {
            return Err(AmountError(raw.to_string()));
        }

        let normalized = if is_localized(&s) {
            s.replace('.', "").replace(',', ".")
        } else {
            s
        };
        let value = Decimal::from_str(&normalized).map_err(|_| AmountError(raw.to_string()))?;

        Ok(Money::from_decimal(if negative { -value } else { value }))
    }

    /// Renders with a decimal comma and no thousands separator, the layout
    /// spreadsheet tools expect in `;`-separated exports.
    pub fn to_decimal_comma(self) -> String {
        format!("{:.2}", self.0).replace('.', ",")
    }
}

/// A comma means decimal comma. Without one, dots are thousands separators
/// only when every group after the first has exactly three digits.
fn is_localized(s: &str) -> bool {
    if s.contains(',') {
        return true;
    }
    let mut groups = s.split('.');
    groups.next();
    let mut saw_dot = false;
    for group in groups {
        saw_dot = true;
        if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    saw_dot
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R$ {}", self.to_decimal_comma())
    }
}

impl FromStr for Money {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}
