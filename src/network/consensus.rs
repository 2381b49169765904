//! Longest-valid-chain conflict resolution.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::blockchain::{Block, Blockchain};

/// Errors that can occur while talking to a peer
///
/// None of these abort a resolution pass; the peer is skipped.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("Peer {peer} sent a malformed response: {reason}")]
    MalformedResponse { peer: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Body of `GET /chain`, shared by every node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// The length of the chain
    pub length: usize,
}

impl ChainResponse {
    pub fn new(chain: Vec<Block>) -> Self {
        ChainResponse {
            length: chain.len(),
            chain,
        }
    }
}

/// Outcome of a resolution pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Resolution {
    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The local chain after the pass
    pub chain: Vec<Block>,
}

/// Where peer chains come from
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, ConsensusError>;
}

/// Fetches `GET http://{peer}/chain` with a bounded timeout
#[derive(Debug, Clone)]
pub struct HttpChainSource {
    client: reqwest::Client,
}

impl HttpChainSource {
    pub fn new(timeout: Duration) -> Result<Self, ConsensusError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpChainSource { client })
    }
}

#[async_trait]
impl ChainSource for HttpChainSource {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, ConsensusError> {
        let url = format!("http://{}/chain", peer);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConsensusError::PeerUnreachable {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ConsensusError::PeerUnreachable {
                peer: peer.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response
            .json::<ChainResponse>()
            .await
            .map_err(|e| ConsensusError::MalformedResponse {
                peer: peer.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Adopts the longest valid peer chain that beats the local one
///
/// All peers are queried concurrently. Unreachable peers, malformed
/// responses and invalid chains are logged and skipped. Ties keep the local
/// chain.
pub async fn resolve(blockchain: &Blockchain, peers: &[String], source: &dyn ChainSource) -> Resolution {
    let responses = join_all(peers.iter().map(|peer| source.fetch_chain(peer))).await;

    let mut max_length = blockchain.len();
    let mut best: Option<Vec<Block>> = None;

    for (peer, response) in peers.iter().zip(responses) {
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!("Skipping peer: {}", err);
                continue;
            }
        };

        if response.length != response.chain.len() {
            warn!(
                "Skipping peer {}: reported length {} but sent {} blocks",
                peer,
                response.length,
                response.chain.len()
            );
            continue;
        }

        if response.length <= max_length {
            continue;
        }

        match blockchain.check_chain(&response.chain) {
            Ok(()) => {
                max_length = response.length;
                best = Some(response.chain);
            }
            Err(err) => warn!("Skipping peer {}: {}", peer, err),
        }
    }

    let replaced = match best {
        Some(chain) => blockchain.replace_chain(chain),
        None => false,
    };

    if replaced {
        info!("Our chain was replaced");
    } else {
        info!("Our chain is authoritative");
    }

    Resolution {
        replaced,
        chain: blockchain.chain(),
    }
}
