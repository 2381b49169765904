use log::{debug, info};

use super::block::Block;
use super::hash::sha256_hex;

/// Proof-of-work engine
///
/// A proof `p` is valid after a block with proof `p'` and hash `h` when
/// `sha256(p' || p || h)` (decimal proofs, concatenated as text) starts with
/// `difficulty` zero characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfWork {
    target: String,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork {
            target: "0".repeat(difficulty),
        }
    }

    pub fn difficulty(&self) -> usize {
        self.target.len()
    }

    /// Checks the difficulty predicate for one candidate
    pub fn is_valid_proof(&self, last_proof: u64, proof: u64, last_hash: &str) -> bool {
        let guess = format!("{}{}{}", last_proof, proof, last_hash);
        sha256_hex(guess.as_bytes()).starts_with(&self.target)
    }

    /// Finds the smallest proof that follows `last_block`
    ///
    /// CPU-bound with no upper bound on the search; callers must not hold
    /// the chain lock while this runs.
    pub fn mine(&self, last_block: &Block) -> u64 {
        info!("Starting proof of work for block {}", last_block.index);

        let last_hash = last_block.hash();
        let mut proof = 0;

        while !self.is_valid_proof(last_block.proof, proof, &last_hash) {
            proof += 1;
        }

        debug!("Proof search after block {} took {} attempts", last_block.index, proof + 1);
        info!("Proof of work completed. Proof: {}", proof);
        proof
    }
}
