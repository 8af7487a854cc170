//! Accounts, balances, and currency equivalence.
//!
//! Balances are held per account and currency by the ledger and can never go
//! negative. Some currencies are interchangeable 1:1 for funding purposes
//! (a USD-pegged stablecoin and USD itself). That business rule lives in one
//! small lookup table, [`CurrencyEquivalence`], consulted when resolving which
//! balance funds a trade.

use crate::config::ConfigError;
use crate::types::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    // settlement currency, margin is locked and released in this currency
    pub currency: String,
}

impl Account {
    pub fn new(currency: &str) -> Self {
        Self {
            id: AccountId::new(),
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyEquivalence {
    pub classes: Vec<Vec<String>>,
}

impl Default for CurrencyEquivalence {
    fn default() -> Self {
        Self {
            classes: vec![vec!["USD".to_string(), "USDT".to_string()]],
        }
    }
}

impl CurrencyEquivalence {
    pub fn none() -> Self {
        Self { classes: Vec::new() }
    }

    /// Currencies interchangeable with `currency`, excluding itself.
    pub fn equivalents(&self, currency: &str) -> Vec<&str> {
        self.classes
            .iter()
            .find(|class| class.iter().any(|c| c == currency))
            .map(|class| {
                class
                    .iter()
                    .map(String::as_str)
                    .filter(|c| *c != currency)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn are_equivalent(&self, a: &str, b: &str) -> bool {
        a == b || self.equivalents(a).contains(&b)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for class in &self.classes {
            if class.len() < 2 {
                return Err(ConfigError::InvalidCurrencies {
                    reason: format!("class {class:?} needs at least two currencies"),
                });
            }
            for currency in class {
                if !seen.insert(currency.as_str()) {
                    return Err(ConfigError::InvalidCurrencies {
                        reason: format!("{currency} appears in more than one class"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The balance chosen to fund a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingSource {
    pub currency: String,
    pub available: Decimal,
}

/// Picks the balance that funds a debit in `preferred`.
///
/// A positive preferred balance always wins. Otherwise the equivalent
/// currency with the largest balance is used, provided it holds more than the
/// preferred one. Balances are never summed across currencies: the returned
/// currency is the one that actually gets debited.
pub fn resolve_funding<E>(
    preferred: &str,
    equivalence: &CurrencyEquivalence,
    mut balance_of: impl FnMut(&str) -> Result<Decimal, E>,
) -> Result<FundingSource, E> {
    let preferred_balance = balance_of(preferred)?;
    if preferred_balance > Decimal::ZERO {
        return Ok(FundingSource {
            currency: preferred.to_string(),
            available: preferred_balance,
        });
    }

    let mut best = FundingSource {
        currency: preferred.to_string(),
        available: preferred_balance,
    };
    for alt in equivalence.equivalents(preferred) {
        let alt_balance = balance_of(alt)?;
        if alt_balance > best.available {
            best = FundingSource {
                currency: alt.to_string(),
                available: alt_balance,
            };
        }
    }
    Ok(best)
}
