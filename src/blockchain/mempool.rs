//! Pending transactions awaiting inclusion in a block.

use super::transaction::Transaction;

/// FIFO pool of admitted, unconfirmed transactions
///
/// Entries are identified by value. Two byte-identical transactions are
/// indistinguishable, so removing one removes whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transaction in submission order.
    pub fn add(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    /// Returns up to `n` of the oldest transactions without removing them.
    pub fn peek(&self, n: usize) -> Vec<Transaction> {
        self.transactions.iter().take(n).cloned().collect()
    }

    /// Removes the first entry equal to each listed transaction.
    ///
    /// Transactions that are not in the pool are ignored.
    pub fn remove(&mut self, transactions: &[Transaction]) {
        for transaction in transactions {
            if let Some(position) = self.transactions.iter().position(|t| t == transaction) {
                self.transactions.remove(position);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Drops every transaction, returning them in order.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }
}
