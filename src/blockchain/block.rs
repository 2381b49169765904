use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::hash::{canonical_string, sha256_hex};
use super::transaction::Transaction;

/// Represents a block in the blockchain
///
/// The block's own hash is never stored; it is recomputed from the fields
/// with [`Block::hash`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// 1-based position of the block in the chain
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions included in this block, oldest first
    pub transactions: Vec<Transaction>,

    /// Proof of work (nonce)
    pub proof: u64,

    /// Hash of the previous block
    pub previous_hash: String,
}

impl Block {
    /// Creates a new block stamped with the current time
    pub fn new(index: u64, transactions: Vec<Transaction>, proof: u64, previous_hash: String) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            transactions,
            proof,
            previous_hash,
        }
    }

    /// Creates the genesis block
    ///
    /// Index 1, no transactions, a fixed seed proof and a sentinel previous
    /// hash.
    pub fn genesis(proof: u64, previous_hash: &str) -> Self {
        Block::new(1, Vec::new(), proof, previous_hash.to_string())
    }

    /// SHA-256 hex digest over the canonical encoding of the block
    ///
    /// Keys are sorted before hashing, so blocks built by nodes that
    /// serialize fields in a different order still agree.
    pub fn hash(&self) -> String {
        let block_data = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "proof": self.proof,
            "previous_hash": self.previous_hash,
        });

        sha256_hex(canonical_string(block_data).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_block() {
        let block = Block::genesis(100, "1");

        assert_eq!(block.index, 1);
        assert_eq!(block.proof, 100);
        assert_eq!(block.previous_hash, "1");
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn test_hash_is_fixed_width_hex() {
        let block = Block::new(2, vec![Transaction::new_mint("miner", 1.0)], 7, "abc".to_string());
        let hash = block.hash();

        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, block.clone().hash());
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let block = Block::new(2, vec![Transaction::new("a", "b", 1.0)], 7, "abc".to_string());
        let original = block.hash();

        let mut changed = block.clone();
        changed.proof = 8;
        assert_ne!(changed.hash(), original);

        let mut changed = block.clone();
        changed.transactions[0].amount = 2.0;
        assert_ne!(changed.hash(), original);

        let mut changed = block.clone();
        changed.previous_hash = "abd".to_string();
        assert_ne!(changed.hash(), original);
    }

    #[test]
    fn test_hash_ignores_field_order_on_the_wire() {
        let block = Block::new(3, vec![Transaction::new("a", "b", 1.5)], 42, "prev".to_string());
        let timestamp = serde_json::to_value(block.timestamp).unwrap();

        let reordered = format!(
            r#"{{"previous_hash":"prev","proof":42,"transactions":[{{"amount":1.5,"recipient":"b","sender":"a"}}],"timestamp":{},"index":3}}"#,
            timestamp
        );
        let parsed: Block = serde_json::from_str(&reordered).unwrap();

        assert_eq!(parsed.hash(), block.hash());
    }
}
