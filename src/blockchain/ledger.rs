use std::collections::HashMap;

use thiserror::Error;

use super::transaction::{Address, Transaction};

/// Errors that can occur during balance accounting
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient balance for {account}: required {required}, available {available}")]
    InsufficientBalance {
        account: String,
        required: f64,
        available: f64,
    },
}

/// Per-account balances
///
/// Unseen accounts read as 0. Only non-mint senders are debited, and a
/// debit never takes a balance below zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceLedger {
    balances: HashMap<Address, f64>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an account's balance, 0 if the account has never been seen
    pub fn balance(&self, account: &Address) -> f64 {
        self.balances.get(account).copied().unwrap_or(0.0)
    }

    /// Checks that the sender can cover the transfer
    ///
    /// The mint sender always can. Any other sender must already be tracked
    /// and hold at least `amount`.
    pub fn check(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        if transaction.is_mint() {
            return Ok(());
        }

        match self.balances.get(&transaction.sender) {
            Some(balance) if *balance >= transaction.amount => Ok(()),
            balance => Err(LedgerError::InsufficientBalance {
                account: transaction.sender.0.clone(),
                required: transaction.amount,
                available: balance.copied().unwrap_or(0.0),
            }),
        }
    }

    /// Checks and applies a transfer
    ///
    /// Debits the sender (skipped for the mint) and credits the recipient.
    /// Leaves the ledger untouched on error.
    pub fn apply(&mut self, transaction: &Transaction) -> Result<(), LedgerError> {
        self.check(transaction)?;

        if !transaction.is_mint() {
            if let Some(balance) = self.balances.get_mut(&transaction.sender) {
                *balance -= transaction.amount;
            }
        }

        *self
            .balances
            .entry(transaction.recipient.clone())
            .or_insert(0.0) += transaction.amount;

        Ok(())
    }

    /// All tracked accounts and their balances
    pub fn accounts(&self) -> Vec<(Address, f64)> {
        let mut accounts: Vec<(Address, f64)> = self
            .balances
            .iter()
            .map(|(address, balance)| (address.clone(), *balance))
            .collect();
        accounts.sort_by(|a, b| a.0.cmp(&b.0));
        accounts
    }
}
