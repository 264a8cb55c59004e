use postgres_from_row::FromRow;
use serde::Deserialize;
use serde::Serialize;

use super::operations::DecodedOperation;
use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::BlockHash;
use crate::core::types::Cycle;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::ProtocolHash;
use crate::core::types::Timestamp;

/// A block as produced by a chain source, with decoded operations in on-chain order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedBlock {
    pub level: Level,
    pub hash: BlockHash,
    pub predecessor: BlockHash,
    pub timestamp: Timestamp,
    pub protocol: ProtocolHash,
    #[serde(default)]
    pub payload_round: i32,
    /// Baker of the block payload
    pub proposer: Address,
    /// Baker of the block itself, same as proposer when none.
    #[serde(default)]
    pub producer: Option<Address>,
    /// Credited to the proposer
    #[serde(default)]
    pub reward: Mutez,
    /// Credited to the producer
    #[serde(default)]
    pub bonus: Mutez,
    #[serde(default)]
    pub operations: Vec<DecodedOperation>,
}

impl DecodedBlock {
    pub fn producer(&self) -> &Address {
        self.producer.as_ref().unwrap_or(&self.proposer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Block {
    pub level: Level,
    pub hash: BlockHash,
    pub cycle: Cycle,
    pub timestamp: Timestamp,
    pub proto_code: i32,
    pub payload_round: i32,
    pub proposer_id: AccountId,
    pub producer_id: AccountId,
    pub reward: Mutez,
    pub bonus: Mutez,
    /// Baker fees of included operations
    pub fees: Mutez,
    pub operations_count: i32,
    /// Consensus slots covered by included (pre)endorsements
    pub validations: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Protocol {
    pub code: i32,
    pub hash: ProtocolHash,
    pub first_level: Level,
    pub first_cycle: Cycle,
    /// Set once the next protocol activates.
    pub last_level: Option<Level>,
}
