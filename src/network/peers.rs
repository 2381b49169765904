use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Url;
use thiserror::Error;

/// Errors that can occur while managing peers
#[derive(Debug, Error, PartialEq)]
pub enum PeerError {
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),
}

/// Known peers, deduplicated by `host:port`
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: Arc<RwLock<BTreeSet<String>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer given as `http://host:port` or bare `host:port`
    ///
    /// Returns the normalized `host:port` that was stored.
    pub fn register(&self, address: &str) -> Result<String, PeerError> {
        let netloc = normalize(address)?;
        self.peers.write().insert(netloc.clone());
        Ok(netloc)
    }

    /// Adds several peers, stopping at the first invalid address
    pub fn register_all<I, S>(&self, addresses: I) -> Result<Vec<String>, PeerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        addresses
            .into_iter()
            .map(|address| self.register(address.as_ref()))
            .collect()
    }

    /// Snapshot of the known peers, sorted
    pub fn list(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

/// Reduces an address to `host[:port]`
pub fn normalize(address: &str) -> Result<String, PeerError> {
    let address = address.trim();
    let invalid = || PeerError::InvalidAddress(address.to_string());

    let url = if address.contains("://") {
        Url::parse(address).map_err(|_| invalid())?
    } else {
        let url = Url::parse(&format!("http://{}", address)).map_err(|_| invalid())?;
        if url.path() != "/" || url.query().is_some() {
            return Err(invalid());
        }
        url
    };

    let host = url.host_str().filter(|host| !host.is_empty()).ok_or_else(invalid)?;

    // Keep default ports explicit; peers are always fetched over plain http
    Ok(match url.port_or_known_default() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
