use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use parking_lot::RwLock;
use thiserror::Error;

use super::block::Block;
use super::contract::ContractError;
use super::ledger::{BalanceLedger, LedgerError};
use super::mempool::Mempool;
use super::pow::ProofOfWork;
use super::transaction::{Address, Transaction, TransactionError};
use crate::config::NodeConfig;
use crate::network::peers::PeerError;

/// How far past the local clock a block timestamp may run
pub const MAX_FUTURE_DRIFT_SECS: i64 = 2 * 60 * 60;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    #[error("Contract error: {0}")]
    ContractError(#[from] ContractError),

    #[error("Peer error: {0}")]
    PeerError(#[from] PeerError),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

/// State guarded by the node's single lock
///
/// Block creation, admission and chain replacement all take the write side,
/// so they never interleave.
#[derive(Debug, Clone)]
struct ChainState {
    chain: Vec<Block>,
    mempool: Mempool,
    ledger: BalanceLedger,
}

impl ChainState {
    fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    fn next_index(&self) -> u64 {
        self.chain.len() as u64 + 1
    }
}

/// The chain manager: one chain, its mempool and its balances
#[derive(Debug, Clone)]
pub struct Blockchain {
    state: Arc<RwLock<ChainState>>,

    pow: ProofOfWork,

    /// Maximum transactions per block
    batch_size: usize,
}

impl Blockchain {
    /// Creates a new blockchain holding only the genesis block
    pub fn new(config: &NodeConfig) -> Self {
        let genesis = Block::genesis(config.genesis_proof, &config.genesis_previous_hash);
        info!("Created genesis block {}", genesis.hash());

        Blockchain {
            state: Arc::new(RwLock::new(ChainState {
                chain: vec![genesis],
                mempool: Mempool::new(),
                ledger: BalanceLedger::new(),
            })),
            pow: ProofOfWork::new(config.difficulty),
            batch_size: config.block_batch_size,
        }
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Block {
        self.state.read().last_block().clone()
    }

    /// Gets the entire chain
    pub fn chain(&self) -> Vec<Block> {
        self.state.read().chain.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().chain.len()
    }

    /// Gets a snapshot of the mempool, oldest first
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.read().mempool.transactions().to_vec()
    }

    pub fn balance(&self, account: &Address) -> f64 {
        self.state.read().ledger.balance(account)
    }

    pub fn balances(&self) -> Vec<(Address, f64)> {
        self.state.read().ledger.accounts()
    }

    /// Admits a transaction into the mempool
    ///
    /// Checks shape and signature, then funds; applies the transfer to the
    /// balances and enqueues it. Any failure leaves balances and mempool
    /// untouched. Returns the index of the block the transaction is expected
    /// to land in.
    pub fn admit(&self, transaction: Transaction) -> Result<u64, BlockchainError> {
        self.admit_with(transaction, |_| Ok(()))
    }

    /// Like [`Blockchain::admit`], with `vet` run between the signature and
    /// balance checks
    pub fn admit_with<F>(&self, transaction: Transaction, vet: F) -> Result<u64, BlockchainError>
    where
        F: FnOnce(&Transaction) -> Result<(), BlockchainError>,
    {
        transaction.check_well_formed()?;
        transaction.verify()?;
        vet(&transaction)?;

        let mut state = self.state.write();
        Self::admit_locked(&mut state, transaction)
    }

    fn admit_locked(state: &mut ChainState, transaction: Transaction) -> Result<u64, BlockchainError> {
        state.ledger.apply(&transaction)?;
        debug!(
            "Admitted {} -> {} ({})",
            transaction.sender, transaction.recipient, transaction.amount
        );
        state.mempool.add(transaction);
        Ok(state.next_index())
    }

    /// Forges a block from the oldest pending transactions and appends it
    ///
    /// `previous_hash` defaults to the hash of the current last block.
    pub fn new_block(&self, proof: u64, previous_hash: Option<String>) -> Block {
        let mut state = self.state.write();
        self.forge_locked(&mut state, proof, previous_hash)
    }

    fn forge_locked(&self, state: &mut ChainState, proof: u64, previous_hash: Option<String>) -> Block {
        let last_block = state.last_block();
        let previous_hash = previous_hash.unwrap_or_else(|| last_block.hash());

        // Wall-clock, nudged forward if the clock has not moved since the
        // last block
        let timestamp = match last_block.timestamp.checked_add_signed(Duration::microseconds(1)) {
            Some(earliest) => Utc::now().max(earliest),
            None => Utc::now().max(last_block.timestamp),
        };

        if state.mempool.is_empty() {
            debug!("Forging block {} with no pending transactions", state.next_index());
        }

        let transactions = state.mempool.peek(self.batch_size);
        state.mempool.remove(&transactions);

        let block = Block {
            index: state.next_index(),
            timestamp,
            transactions,
            proof,
            previous_hash,
        };
        state.chain.push(block.clone());

        block
    }

    /// Mines and appends one block, paying `reward` to `miner`
    ///
    /// The proof search runs without the lock. If another block landed on
    /// the head in the meantime, the search restarts against the new head.
    pub fn mine(&self, miner: &Address, reward: f64) -> Block {
        loop {
            let last_block = self.last_block();
            let proof = self.pow.mine(&last_block);

            let mut state = self.state.write();
            if state.last_block() != &last_block {
                info!(
                    "Chain head moved past block {} during proof search, retrying",
                    last_block.index
                );
                continue;
            }

            let reward_transaction = Transaction::new_mint(miner.clone(), reward);
            if let Err(err) = Self::admit_locked(&mut state, reward_transaction) {
                warn!("Mining reward for {} not admitted: {}", miner, err);
            }

            let block = self.forge_locked(&mut state, proof, Some(last_block.hash()));
            info!(
                "New block forged: index {} with {} transactions",
                block.index,
                block.transactions.len()
            );
            return block;
        }
    }

    /// Checks a candidate chain, explaining the first failure
    ///
    /// The genesis block is taken as given. Every later block must link to
    /// its predecessor's hash, carry a valid proof, be strictly newer but no
    /// more than [`MAX_FUTURE_DRIFT_SECS`] ahead of our clock, and hold only
    /// well-formed transactions.
    pub fn check_chain(&self, chain: &[Block]) -> Result<(), BlockchainError> {
        let Some(mut last_block) = chain.first() else {
            return Err(BlockchainError::InvalidChain("empty chain".to_string()));
        };

        let latest_allowed = Utc::now() + Duration::seconds(MAX_FUTURE_DRIFT_SECS);

        for block in &chain[1..] {
            let last_hash = last_block.hash();

            if block.previous_hash != last_hash {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} does not link to its predecessor",
                    block.index
                )));
            }

            if !self.pow.is_valid_proof(last_block.proof, block.proof, &block.previous_hash) {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} has an invalid proof",
                    block.index
                )));
            }

            if block.timestamp <= last_block.timestamp {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} is not newer than its predecessor",
                    block.index
                )));
            }

            if block.timestamp > latest_allowed {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} is stamped too far in the future",
                    block.index
                )));
            }

            for transaction in &block.transactions {
                transaction.check_well_formed().map_err(|err| {
                    BlockchainError::InvalidChain(format!("block {}: {}", block.index, err))
                })?;
            }

            last_block = block;
        }

        Ok(())
    }

    /// Determines if a given chain is valid
    pub fn validate_chain(&self, chain: &[Block]) -> bool {
        match self.check_chain(chain) {
            Ok(()) => true,
            Err(err) => {
                debug!("Chain rejected: {}", err);
                false
            }
        }
    }

    /// Validates our own chain
    pub fn is_valid(&self) -> bool {
        let chain = self.chain();
        self.validate_chain(&chain)
    }

    /// Replaces the chain if `candidate` is strictly longer and valid
    ///
    /// Pending transactions already in the adopted chain are dropped, and
    /// balances are rebuilt from the adopted chain plus what remains
    /// pending. Returns whether the chain was replaced.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.len() {
            return false;
        }

        if let Err(err) = self.check_chain(&candidate) {
            warn!("Refusing to adopt chain: {}", err);
            return false;
        }

        let mut state = self.state.write();
        if candidate.len() <= state.chain.len() {
            return false;
        }

        let mut ledger = BalanceLedger::new();
        for transaction in candidate.iter().flat_map(|block| &block.transactions) {
            if let Err(err) = ledger.apply(transaction) {
                warn!("Adopted chain carries an unfunded transfer, skipping its effect: {}", err);
            }
        }

        let included: Vec<Transaction> = candidate
            .iter()
            .flat_map(|block| block.transactions.iter().cloned())
            .collect();
        state.mempool.remove(&included);

        let mut mempool = Mempool::new();
        for transaction in state.mempool.drain() {
            match ledger.apply(&transaction) {
                Ok(()) => mempool.add(transaction),
                Err(err) => warn!("Dropping pending transaction after chain switch: {}", err),
            }
        }

        info!(
            "Replaced chain of length {} with chain of length {}",
            state.chain.len(),
            candidate.len()
        );
        state.chain = candidate;
        state.mempool = mempool;
        state.ledger = ledger;

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::thread;

    fn blockchain() -> Blockchain {
        Blockchain::new(&NodeConfig::fast(1))
    }

    fn mine_plain(blockchain: &Blockchain) -> Block {
        let proof = blockchain.pow().mine(&blockchain.last_block());
        blockchain.new_block(proof, None)
    }

    #[test]
    fn test_new_blockchain() {
        let blockchain = blockchain();
        let chain = blockchain.chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 1);
        assert_eq!(chain[0].previous_hash, "1");
        assert_eq!(chain[0].proof, 100);
        assert!(chain[0].transactions.is_empty());
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_admit_returns_next_index() {
        let blockchain = blockchain();

        let index = blockchain.admit(Transaction::new_mint("alice", 10.0)).unwrap();

        assert_eq!(index, 2);
        assert_eq!(blockchain.pending_transactions().len(), 1);
        assert_eq!(blockchain.balance(&Address::from("alice")), 10.0);
    }

    #[test]
    fn test_mint_then_overdraw_scenario() {
        let blockchain = blockchain();
        let mint = Transaction::new_mint("A", 10.0);

        blockchain.admit(mint.clone()).unwrap();
        let block = mine_plain(&blockchain);

        assert_eq!(block.index, 2);
        assert_eq!(block.transactions, vec![mint]);
        assert_eq!(blockchain.balance(&Address::from("A")), 10.0);

        let balances_before = blockchain.balances();
        let result = blockchain.admit(Transaction::new("A", "B", 15.0));

        assert!(matches!(
            result,
            Err(BlockchainError::LedgerError(LedgerError::InsufficientBalance { .. }))
        ));
        assert!(blockchain.pending_transactions().is_empty());
        assert_eq!(blockchain.balances(), balances_before);
    }

    #[test]
    fn test_exact_balance_then_one_short() {
        let blockchain = blockchain();
        blockchain.admit(Transaction::new_mint("A", 5.0)).unwrap();

        assert!(blockchain.admit(Transaction::new("A", "B", 5.0)).is_ok());
        assert!(matches!(
            blockchain.admit(Transaction::new("B", "C", 6.0)),
            Err(BlockchainError::LedgerError(_))
        ));
        assert_eq!(blockchain.balance(&Address::from("B")), 5.0);
    }

    #[test]
    fn test_bad_signature_leaves_state_unchanged() {
        let blockchain = blockchain();
        let keypair = crate::blockchain::crypto::KeyPair::generate();
        let mut transaction = Transaction::new_mint("A", 1.0).sign(&keypair);
        transaction.amount = 2.0;

        let result = blockchain.admit(transaction);

        assert!(matches!(
            result,
            Err(BlockchainError::TransactionError(TransactionError::InvalidSignature))
        ));
        assert!(blockchain.pending_transactions().is_empty());
        assert_eq!(blockchain.balance(&Address::from("A")), 0.0);
    }

    #[test]
    fn test_malformed_transaction_rejected() {
        let blockchain = blockchain();

        let result = blockchain.admit(Transaction::new_mint("A", -3.0));

        assert!(matches!(
            result,
            Err(BlockchainError::TransactionError(TransactionError::MalformedTransaction(_)))
        ));
    }

    #[test]
    fn test_block_batch_cap() {
        let blockchain = blockchain();
        for i in 0..12 {
            blockchain.admit(Transaction::new_mint("A", i as f64)).unwrap();
        }

        let block = mine_plain(&blockchain);

        assert_eq!(block.transactions.len(), 10);
        assert_eq!(block.transactions[0].amount, 0.0);
        assert_eq!(blockchain.pending_transactions().len(), 2);
        assert_eq!(blockchain.pending_transactions()[0].amount, 10.0);
    }

    #[test]
    fn test_mine_pays_reward() {
        let blockchain = blockchain();
        let miner = Address::from("miner");

        let block = blockchain.mine(&miner, 1.0);

        assert_eq!(block.index, 2);
        assert_eq!(block.transactions, vec![Transaction::new_mint("miner", 1.0)]);
        assert_eq!(blockchain.balance(&miner), 1.0);
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_valid_chain_detects_tampering() {
        let blockchain = blockchain();
        blockchain.admit(Transaction::new_mint("A", 3.0)).unwrap();
        blockchain.mine(&Address::from("m"), 1.0);
        blockchain.admit(Transaction::new("A", "B", 1.0)).unwrap();
        blockchain.mine(&Address::from("m"), 1.0);

        let chain = blockchain.chain();
        assert!(blockchain.validate_chain(&chain));

        let mut tampered = chain.clone();
        tampered[1].transactions[0].amount = 300.0;
        assert!(!blockchain.validate_chain(&tampered));

        let mut tampered = chain.clone();
        tampered[2].previous_hash = "0".repeat(64);
        assert!(!blockchain.validate_chain(&tampered));

        let mut tampered = chain.clone();
        tampered[2].timestamp = tampered[1].timestamp;
        assert!(!blockchain.validate_chain(&tampered));

        let mut tampered = chain.clone();
        tampered[2].transactions[0].recipient = Address::from("");
        assert!(!blockchain.validate_chain(&tampered));
    }

    #[test]
    fn test_invalid_proof_detected() {
        let blockchain = Blockchain::new(&NodeConfig::fast(3));
        blockchain.mine(&Address::from("m"), 1.0);
        let chain = blockchain.chain();
        let pow = blockchain.pow();

        let mut tampered = chain.clone();
        let bad_proof = (0..)
            .find(|p| !pow.is_valid_proof(chain[0].proof, *p, &tampered[1].previous_hash))
            .unwrap();
        tampered[1].proof = bad_proof;

        assert!(!blockchain.validate_chain(&tampered));
    }

    #[test]
    fn test_genesis_only_and_empty_chains() {
        let blockchain = blockchain();

        assert!(blockchain.validate_chain(&blockchain.chain()));
        assert!(!blockchain.validate_chain(&[]));
    }

    #[test]
    fn test_concurrent_mining_never_forks() {
        let blockchain = Blockchain::new(&NodeConfig::fast(2));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let blockchain = blockchain.clone();
                thread::spawn(move || blockchain.mine(&Address::from(format!("miner-{}", i)), 1.0))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let chain = blockchain.chain();
        assert_eq!(chain.len(), 3);
        assert_ne!(chain[1].previous_hash, chain[2].previous_hash);
        assert_eq!(chain[2].previous_hash, chain[1].hash());
        assert!(blockchain.validate_chain(&chain));
    }

    #[test]
    fn test_replace_chain_only_when_longer_and_valid() {
        let local = blockchain();
        let remote = blockchain();
        local.mine(&Address::from("local"), 1.0);
        remote.mine(&Address::from("remote"), 1.0);

        // Same length: kept
        let before = local.chain();
        assert!(!local.replace_chain(remote.chain()));
        assert_eq!(local.chain(), before);

        // Longer but invalid: kept
        remote.mine(&Address::from("remote"), 1.0);
        let mut forged = remote.chain();
        forged[1].transactions[0].amount = 1000.0;
        assert!(!local.replace_chain(forged));
        assert_eq!(local.chain(), before);

        // Longer and valid: adopted
        assert!(local.replace_chain(remote.chain()));
        assert_eq!(local.chain(), remote.chain());
        assert_eq!(local.balance(&Address::from("remote")), 2.0);
        assert_eq!(local.balance(&Address::from("local")), 0.0);
    }

    #[test]
    fn test_replace_chain_prunes_included_pending() {
        let local = blockchain();
        let remote = blockchain();
        let shared = Transaction::new_mint("A", 4.0);
        let local_only = Transaction::new_mint("B", 2.0);

        local.admit(shared.clone()).unwrap();
        local.admit(local_only.clone()).unwrap();
        remote.admit(shared.clone()).unwrap();
        remote.mine(&Address::from("remote"), 1.0);

        assert!(local.replace_chain(remote.chain()));
        assert_eq!(local.pending_transactions(), vec![local_only]);
        assert_eq!(local.balance(&Address::from("A")), 4.0);
        assert_eq!(local.balance(&Address::from("B")), 2.0);
    }

    fn block_after(blockchain: &Blockchain, last: &Block, timestamp: DateTime<Utc>) -> Block {
        Block {
            index: last.index + 1,
            timestamp,
            transactions: vec![],
            proof: blockchain.pow().mine(last),
            previous_hash: last.hash(),
        }
    }

    #[test]
    fn test_far_future_block_rejected() {
        let local = blockchain();
        let genesis = local.last_block();

        let ahead = block_after(&local, &genesis, Utc::now() + Duration::days(1));
        assert!(!local.validate_chain(&[genesis.clone(), ahead.clone()]));
        assert!(!local.replace_chain(vec![genesis.clone(), ahead]));

        // Last representable instant, as a peer would send it
        let at_max = block_after(&local, &genesis, DateTime::<Utc>::MAX_UTC);
        let wire = serde_json::to_string(&vec![genesis.clone(), at_max]).unwrap();
        let candidate: Vec<Block> = serde_json::from_str(&wire).unwrap();

        assert!(!local.validate_chain(&candidate));
        assert!(!local.replace_chain(candidate));
        assert_eq!(local.chain(), vec![genesis]);

        let mined = local.mine(&Address::from("m"), 1.0);
        assert_eq!(mined.index, 2);
        assert!(local.is_valid());
    }

    #[test]
    fn test_forging_after_max_timestamp_does_not_panic() {
        let local = blockchain();
        local.state.write().chain[0].timestamp = DateTime::<Utc>::MAX_UTC;

        let block = mine_plain(&local);

        assert_eq!(block.index, 2);
        assert_eq!(block.timestamp, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_admit_with_vets_before_funds() {
        let blockchain = blockchain();

        let result = blockchain.admit_with(Transaction::new_mint("A", 5.0), |_| {
            Err(BlockchainError::InvalidChain("vetoed".to_string()))
        });
        assert!(result.is_err());
        assert!(blockchain.pending_transactions().is_empty());
        assert_eq!(blockchain.balance(&Address::from("A")), 0.0);

        // Bad signatures never reach the vetting step
        let keypair = crate::blockchain::KeyPair::generate();
        let mut forged = Transaction::new_mint("A", 5.0).sign(&keypair);
        forged.amount = 6.0;
        let mut vetted = false;
        let result = blockchain.admit_with(forged, |_| {
            vetted = true;
            Ok(())
        });
        assert!(matches!(result, Err(BlockchainError::TransactionError(_))));
        assert!(!vetted);
    }
}
