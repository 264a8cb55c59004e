use serde::Deserialize;
use serde::Serialize;

use crate::core::types::Address;
use crate::core::types::BlockHash;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::ProtocolHash;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeHeader {
    pub level: Level,
    pub hash: BlockHash,
    pub predecessor: BlockHash,
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub protocol: ProtocolHash,
    #[serde(default)]
    pub payload_round: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeBlock {
    #[serde(flatten)]
    pub header: NodeHeader,
    pub proposer: Address,
    #[serde(default)]
    pub producer: Option<Address>,
    #[serde(default)]
    pub reward: Mutez,
    #[serde(default)]
    pub bonus: Mutez,
    /// Operations in on-chain order, as served by the node
    #[serde(default)]
    pub operations: Vec<serde_json::Value>,
}
