use serde::Deserialize;
use serde::Serialize;

use crate::core::types::Cycle;
use crate::core::types::Level;
use crate::core::types::Mutez;

/// Reward credited to a delegate at the end of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    #[serde(default)]
    pub expected: Mutez,
    pub received: Mutez,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevelationPenalty {
    pub missed_level: Level,
    pub loss: Mutez,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationKind {
    Bootstrap,
    ActivateDelegate,
    Airdrop,
    ProposalInvoice,
    Subsidy,
    CodeChange,
    Origination,
}

/// Balance change applied by the protocol itself, typically at activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    #[serde(rename = "migration_kind")]
    pub kind: MigrationKind,
    #[serde(default)]
    pub balance_change: Mutez,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutostakingAction {
    Stake,
    Unstake,
    Finalize,
    Restake,
}

/// Staking movement performed by the protocol on behalf of a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Autostaking {
    pub action: AutostakingAction,
    pub amount: Mutez,
    #[serde(default)]
    pub request_cycle: Option<Cycle>,
}
