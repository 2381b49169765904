// Network module
//
// Everything a node needs to talk to other nodes:
// - Peer set
// - Longest-valid-chain consensus
// - Registry-based peer discovery

pub mod consensus;
pub mod discovery;
pub mod peers;

pub use consensus::{ChainResponse, ChainSource, HttpChainSource, Resolution};
pub use discovery::{HttpPeerRegistry, PeerRegistry};
pub use peers::{PeerError, PeerSet};
