//! A ledger node: one chain, its peers and its contracts.
//!
//! Every operation the HTTP layer exposes goes through [`Node`]. Nodes are
//! plain values, so several can live in one process.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::blockchain::contract::ContractError;
use crate::blockchain::{
    Address, Block, Blockchain, BlockchainError, ContractRegistry, EncodedKeyPair, KeyPair,
    Transaction,
};
use crate::config::NodeConfig;
use crate::network::{consensus, ChainSource, PeerError, PeerSet, Resolution};

#[derive(Clone)]
pub struct Node {
    /// Recipient of this node's mining rewards
    id: String,

    config: Arc<NodeConfig>,

    blockchain: Blockchain,

    peers: PeerSet,

    contracts: ContractRegistry,

    /// Address of the contract every admission must pass, if any
    governing_contract: Arc<RwLock<Option<String>>>,

    chain_source: Arc<dyn ChainSource>,
}

impl Node {
    /// Creates a node with a fresh genesis block
    ///
    /// A configured governing contract is deployed and enforced right away.
    pub fn new(config: NodeConfig, chain_source: Arc<dyn ChainSource>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let blockchain = Blockchain::new(&config);
        let contracts = ContractRegistry::new();

        let governing_contract = config.governing_contract.as_deref().map(|code| {
            let address = contracts.deploy(code);
            info!("Governing contract deployed at {}", address);
            address
        });

        info!("Node {} ready (difficulty {})", id, blockchain.pow().difficulty());

        Node {
            id,
            config: Arc::new(config),
            blockchain,
            peers: PeerSet::new(),
            contracts,
            governing_contract: Arc::new(RwLock::new(governing_contract)),
            chain_source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Submits a transfer
    ///
    /// Runs the signature check, then the governing contract, then the
    /// balance check, and finally queues the transaction. Returns the index
    /// of the block it is expected to land in.
    pub fn submit_transaction(
        &self,
        sender: &str,
        recipient: &str,
        amount: f64,
        signature: Option<String>,
        public_key: Option<String>,
    ) -> Result<u64, BlockchainError> {
        let transaction = Transaction::new(sender, recipient, amount).with_signature(signature, public_key);
        let governing = self.governing_contract.read().clone();

        self.blockchain.admit_with(transaction, |transaction| {
            let Some(address) = governing else {
                return Ok(());
            };

            if !self.contracts.execute(&address, transaction)? {
                warn!("Transaction {} -> {} vetoed by contract", sender, recipient);
                return Err(ContractError::Rejected(address).into());
            }
            Ok(())
        })
    }

    /// Mines one block and pays this node the configured reward
    ///
    /// Blocks the calling thread for the whole proof search.
    pub fn mine(&self) -> Block {
        self.blockchain
            .mine(&Address::from(self.id.as_str()), self.config.mining_reward)
    }

    /// The chain and its length
    pub fn last_block(&self) -> Block {
        self.blockchain.last_block()
    }

    /// Number of blocks, genesis included
    pub fn height(&self) -> usize {
        self.blockchain.len()
    }

    pub fn get_chain(&self) -> (Vec<Block>, usize) {
        let chain = self.blockchain.chain();
        let length = chain.len();
        (chain, length)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.blockchain.pending_transactions()
    }

    pub fn balance(&self, account: &str) -> f64 {
        self.blockchain.balance(&Address::from(account))
    }

    /// Every tracked account with its balance, sorted by account
    pub fn balances(&self) -> Vec<(Address, f64)> {
        self.blockchain.balances()
    }

    /// Revalidates the local chain from genesis
    pub fn is_chain_valid(&self) -> bool {
        self.blockchain.is_valid()
    }

    pub fn register_peer(&self, address: &str) -> Result<String, PeerError> {
        let peer = self.peers.register(address)?;
        info!("Registered peer {}", peer);
        Ok(peer)
    }

    /// Registers several peers, stopping at the first invalid address
    pub fn register_peers(&self, addresses: &[String]) -> Result<Vec<String>, PeerError> {
        let registered = self.peers.register_all(addresses)?;
        info!("Registered {} peers ({} known)", registered.len(), self.peers.len());
        Ok(registered)
    }

    pub fn get_peers(&self) -> Vec<String> {
        self.peers.list()
    }

    /// Queries every known peer and adopts a strictly longer valid chain
    pub async fn resolve_consensus(&self) -> Resolution {
        if self.peers.is_empty() {
            debug!("No peers known, keeping local chain");
        }

        let peers = self.peers.list();
        consensus::resolve(&self.blockchain, &peers, self.chain_source.as_ref()).await
    }

    pub fn deploy_contract(&self, code: &str) -> String {
        let address = self.contracts.deploy(code);
        info!("Contract deployed at {}", address);
        address
    }

    pub fn execute_contract(&self, address: &str, transaction: &Transaction) -> Result<bool, ContractError> {
        self.contracts.execute(address, transaction)
    }

    /// Puts every later admission under the contract at `address`
    pub fn set_governing_contract(&self, address: &str) -> Result<(), ContractError> {
        if self.contracts.get(address).is_none() {
            return Err(ContractError::UnknownContract(address.to_string()));
        }
        *self.governing_contract.write() = Some(address.to_string());
        Ok(())
    }

    pub fn clear_governing_contract(&self) {
        *self.governing_contract.write() = None;
    }

    pub fn generate_keypair(&self) -> EncodedKeyPair {
        KeyPair::generate().encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ledger::LedgerError;
    use crate::network::consensus::testing::LocalChainSource;

    fn node() -> Node {
        Node::new(NodeConfig::fast(1), Arc::new(LocalChainSource::default()))
    }

    #[test]
    fn test_mint_mine_overdraw_scenario() {
        let node = node();

        let index = node.submit_transaction("0", "A", 10.0, None, None).unwrap();
        assert_eq!(index, 2);

        let block = node.mine();
        assert_eq!(block.index, 2);
        assert!(block.transactions.contains(&Transaction::new_mint("A", 10.0)));
        assert_eq!(node.balance("A"), 10.0);

        let result = node.submit_transaction("A", "B", 15.0, None, None);
        assert!(matches!(
            result,
            Err(BlockchainError::LedgerError(LedgerError::InsufficientBalance { .. }))
        ));
        assert!(node.pending_transactions().is_empty());
        assert_eq!(node.balance("A"), 10.0);
        assert_eq!(node.balance("B"), 0.0);
    }

    #[test]
    fn test_mining_rewards_node() {
        let node = node();

        node.mine();
        node.mine();

        assert_eq!(node.balance(node.id()), 2.0);
        assert_eq!(node.get_chain().1, 3);
        assert_eq!(node.height(), 3);
        assert_eq!(node.last_block(), node.get_chain().0[2]);
        assert_eq!(node.balances(), vec![(Address::from(node.id()), 2.0)]);
        assert!(node.is_chain_valid());
    }

    #[test]
    fn test_signed_submission() {
        let node = node();
        let keypair = KeyPair::generate();
        let signed = Transaction::new("0", "A", 4.0).sign(&keypair);

        node.submit_transaction("0", "A", 4.0, signed.signature.clone(), signed.public_key.clone())
            .unwrap();
        assert_eq!(node.pending_transactions(), vec![signed.clone()]);

        let result = node.submit_transaction("0", "A", 5.0, signed.signature, signed.public_key);
        assert!(matches!(result, Err(BlockchainError::TransactionError(_))));
        assert_eq!(node.pending_transactions().len(), 1);
    }

    #[test]
    fn test_governing_contract_vetoes() {
        let node = node();
        let address = node.deploy_contract("if amount > 100 { reject() } else { approve() }");
        node.set_governing_contract(&address).unwrap();

        assert!(node.submit_transaction("0", "A", 50.0, None, None).is_ok());

        let result = node.submit_transaction("0", "A", 500.0, None, None);
        assert!(matches!(
            result,
            Err(BlockchainError::ContractError(ContractError::Rejected(_)))
        ));
        assert_eq!(node.balance("A"), 50.0);
        assert_eq!(node.pending_transactions().len(), 1);

        node.clear_governing_contract();
        assert!(node.submit_transaction("0", "A", 500.0, None, None).is_ok());
    }

    #[test]
    fn test_signature_checked_before_governing_contract() {
        let node = node();
        let address = node.deploy_contract("reject()");
        node.set_governing_contract(&address).unwrap();

        let keypair = KeyPair::generate();
        let signed = Transaction::new("0", "A", 4.0).sign(&keypair);
        let result = node.submit_transaction("0", "A", 5.0, signed.signature, signed.public_key);

        assert!(matches!(result, Err(BlockchainError::TransactionError(_))));
    }

    #[test]
    fn test_malformed_governing_contract_rejects_everything() {
        let config = NodeConfig {
            governing_contract: Some("this is not a rule".to_string()),
            ..NodeConfig::fast(1)
        };
        let node = Node::new(config, Arc::new(LocalChainSource::default()));

        let result = node.submit_transaction("0", "A", 1.0, None, None);

        assert!(matches!(
            result,
            Err(BlockchainError::ContractError(ContractError::Rejected(_)))
        ));
    }

    #[test]
    fn test_contract_deploy_and_execute() {
        let node = node();
        let code = "if recipient == 'bob' { approve() }";

        let first = node.deploy_contract(code);
        let second = node.deploy_contract(code);
        assert_eq!(first, second);

        assert!(node.execute_contract(&first, &Transaction::new("a", "bob", 1.0)).unwrap());
        assert!(!node.execute_contract(&first, &Transaction::new("a", "eve", 1.0)).unwrap());
        assert!(matches!(
            node.execute_contract("missing", &Transaction::new("a", "bob", 1.0)),
            Err(ContractError::UnknownContract(_))
        ));
        assert!(node.set_governing_contract("missing").is_err());
    }

    #[test]
    fn test_register_peers() {
        let node = node();

        assert_eq!(node.register_peer("http://127.0.0.1:5001").unwrap(), "127.0.0.1:5001");
        node.register_peer("127.0.0.1:5001").unwrap();
        assert!(node.register_peer("http://").is_err());

        assert_eq!(node.get_peers(), vec!["127.0.0.1:5001"]);

        let addresses = vec!["10.0.0.1:5000".to_string(), "http://10.0.0.2:5000".to_string()];
        assert_eq!(node.register_peers(&addresses).unwrap(), vec!["10.0.0.1:5000", "10.0.0.2:5000"]);
        assert_eq!(node.get_peers().len(), 3);
    }

    #[test]
    fn test_generate_keypair() {
        let node = node();
        let encoded = node.generate_keypair();

        let restored = KeyPair::from_private_key_hex(&encoded.private_key).unwrap();
        assert_eq!(restored.public_key(), encoded.public_key);
    }

    #[tokio::test]
    async fn test_two_node_resolution() {
        let x = node();
        let y_source = Arc::new(LocalChainSource {
            nodes: [("x:5000".to_string(), x.blockchain.clone())].into_iter().collect(),
            ..Default::default()
        });
        let y = Node::new(NodeConfig::fast(1), y_source);

        for _ in 0..3 {
            x.mine();
        }
        y.mine();
        assert_eq!(x.get_chain().1, 4);
        assert_eq!(y.get_chain().1, 2);

        y.register_peer("http://x:5000").unwrap();
        let resolution = y.resolve_consensus().await;

        assert!(resolution.replaced);
        assert_eq!(y.get_chain().0, x.get_chain().0);
        assert_eq!(y.balance(x.id()), 3.0);
        assert_eq!(y.balance(y.id()), 0.0);

        // Already in sync: nothing to adopt
        let resolution = y.resolve_consensus().await;
        assert!(!resolution.replaced);
    }
}
