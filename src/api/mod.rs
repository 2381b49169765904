// HTTP surface of a node
//
// Every handler delegates to crate::node::Node

pub mod handlers;
pub mod routes;

pub use routes::configure_routes;
