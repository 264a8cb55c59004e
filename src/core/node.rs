mod api;
pub mod models;

use api::NodeAPI;
use thiserror::Error;

/// Failure to get a usable response out of a node.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Tezos node is unreachable, check the node url and that the node is running")]
    NodeUnreachable,
    #[error("Node rejected request: {0}")]
    API400BadRequest(String),
    #[error("Node has no such resource: {0}")]
    API404Notfound(String),
    #[error("Node failed to serve {0}")]
    APIError(String),
    #[error("Unexpected node response: {0}")]
    DeserializationError(String),
}

/// A Tezos node serving blocks over its RPC interface.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub api: NodeAPI,
}

impl Node {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: String::from(id),
            api: NodeAPI::new(url),
        }
    }
}
