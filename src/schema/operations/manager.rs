use num_bigint::BigInt;
use serde::Deserialize;
use serde::Serialize;

use crate::core::types::Cycle;
use crate::core::types::Mutez;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reveal {
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction<A> {
    pub target: A,
    pub amount: Mutez,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation<A> {
    /// New delegate, none to withdraw the delegation.
    pub delegate: Option<A>,
    /// Delegate before the operation. Set when applied.
    #[serde(default = "Option::default")]
    pub prev_delegate: Option<A>,
    /// Balance moved between delegates. Set when applied.
    #[serde(default)]
    pub amount: Mutez,
    /// Sender registered itself as a delegate. Set when applied.
    #[serde(default)]
    pub registration: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origination<A> {
    /// Originated contract, none when the operation failed.
    #[serde(default = "Option::default")]
    pub contract: Option<A>,
    #[serde(default = "Option::default")]
    pub delegate: Option<A>,
    #[serde(default)]
    pub balance: Mutez,
    #[serde(default)]
    pub script: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterConstant {
    /// Global address of the constant
    pub address: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncreasePaidStorage<A> {
    pub contract: A,
    /// Bytes
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferTicket<A> {
    pub target: A,
    pub ticketer: A,
    #[serde(with = "crate::schema::amount_str")]
    pub amount: BigInt,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConsensusKey {
    pub public_key: String,
    pub activation_cycle: Cycle,
}

/// Transfer of a delegate's whole spendable balance, signed with its consensus key.
///
/// The sender is the drained delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainDelegate<A> {
    pub target: A,
    pub amount: Mutez,
    /// Share of the drained balance going to the block producer.
    #[serde(default)]
    pub fee: Mutez,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingAction {
    Stake,
    Unstake,
    Finalize,
    SetParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staking<A> {
    pub action: StakingAction,
    #[serde(default)]
    pub amount: Mutez,
    /// Cycle of the unstake request being finalized.
    #[serde(default)]
    pub request_cycle: Option<Cycle>,
    /// Delegate of the sender at the time of the operation. Set when applied.
    #[serde(default = "Option::default")]
    pub baker: Option<A>,
}
