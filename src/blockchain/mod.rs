// Blockchain module
//
// This module contains the ledger core:
// - Block structure and canonical hashing
// - Transactions and signing
// - Mempool
// - Balance ledger
// - Proof of work algorithm
// - Rule contracts
// - The chain manager tying them together

pub mod block;
pub mod chain;
pub mod contract;
pub mod crypto;
pub mod hash;
pub mod ledger;
pub mod mempool;
pub mod pow;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use contract::{ContractError, ContractRegistry};
pub use crypto::{EncodedKeyPair, KeyPair};
pub use transaction::{Address, Transaction};
