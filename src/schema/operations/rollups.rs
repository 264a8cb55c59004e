use serde::Deserialize;
use serde::Serialize;

use crate::core::types::Mutez;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartRollupOriginate<A> {
    /// Originated rollup, none when the operation failed.
    #[serde(default = "Option::default")]
    pub rollup: Option<A>,
    pub pvm_kind: String,
    pub genesis_commitment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartRollupAddMessages {
    pub messages_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartRollupPublish<A> {
    pub rollup: A,
    pub commitment: String,
    /// Bond frozen by this publication, zero if the sender was already bonded.
    #[serde(default)]
    pub bond: Mutez,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartRollupCement<A> {
    pub rollup: A,
    pub commitment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartRollupExecute<A> {
    pub rollup: A,
    pub commitment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefutationOutcome<A> {
    pub winner: A,
    pub loser: A,
    /// Taken from the loser's bond
    pub loss: Mutez,
    /// Credited to the winner
    pub reward: Mutez,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartRollupRefute<A> {
    pub rollup: A,
    pub opponent: A,
    /// Set when the move ends the game.
    #[serde(default = "Option::default")]
    pub outcome: Option<RefutationOutcome<A>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartRollupRecoverBond<A> {
    pub rollup: A,
    pub staker: A,
    pub bond: Mutez,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DalPublishCommitment {
    pub slot: i32,
    pub commitment: String,
}
