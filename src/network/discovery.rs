//! Peer discovery through a central registry.
//!
//! A node announces its own URL with `POST /register {url}` and learns the
//! others from `GET /peers`. The sync task repeats the latter on a fixed
//! interval until told to stop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::peers::PeerSet;

/// Errors that can occur while talking to the registry
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Registry unreachable: {0}")]
    Unreachable(String),

    #[error("Registry answered with status {0}")]
    Status(u16),

    #[error("Malformed registry response: {0}")]
    Malformed(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Body of `POST /register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub url: String,
}

/// A source of peer addresses
#[async_trait]
pub trait PeerRegistry: Send + Sync {
    /// Announces `node_url` to the registry
    async fn announce(&self, node_url: &str) -> Result<(), DiscoveryError>;

    /// Lists every URL the registry knows
    async fn peers(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// Registry client over HTTP with a bounded timeout
#[derive(Debug, Clone)]
pub struct HttpPeerRegistry {
    registry_url: String,
    client: reqwest::Client,
}

impl HttpPeerRegistry {
    pub fn new(registry_url: &str, timeout: Duration) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(HttpPeerRegistry {
            registry_url: registry_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl PeerRegistry for HttpPeerRegistry {
    async fn announce(&self, node_url: &str) -> Result<(), DiscoveryError> {
        let response = self
            .client
            .post(format!("{}/register", self.registry_url))
            .json(&RegisterRequest {
                url: node_url.to_string(),
            })
            .send()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }

        Ok(())
    }

    async fn peers(&self) -> Result<Vec<String>, DiscoveryError> {
        let response = self
            .client
            .get(format!("{}/peers", self.registry_url))
            .send()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }

        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| DiscoveryError::Malformed(e.to_string()))
    }
}

/// Merges the registry's peers into `peers`, returning how many were new
///
/// Registry failures and invalid addresses are logged, never raised.
pub async fn sync_once(registry: &dyn PeerRegistry, peers: &PeerSet) -> usize {
    let discovered = match registry.peers().await {
        Ok(discovered) => discovered,
        Err(err) => {
            error!("Error getting peers: {}", err);
            return 0;
        }
    };

    let before = peers.len();
    for address in discovered {
        if let Err(err) = peers.register(&address) {
            warn!("Ignoring peer from registry: {}", err);
        }
    }

    let added = peers.len() - before;
    debug!("Discovery sync added {} peers ({} known)", added, peers.len());
    added
}

/// Runs [`sync_once`] every `interval` until `shutdown` flips to `true`
///
/// The first sync happens immediately.
pub fn spawn_sync(
    registry: Arc<dyn PeerRegistry>,
    peers: PeerSet,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let added = sync_once(registry.as_ref(), &peers).await;
                    if added > 0 {
                        info!("Discovered {} new peers", added);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Peer sync stopped");
                        break;
                    }
                }
            }
        }
    })
}
