use postgres_from_row::FromRow;

use crate::core::types::AccountId;
use crate::core::types::Cycle as CycleIndex;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::RowId;

/// Snapshot taken when a cycle begins.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Cycle {
    pub index: CycleIndex,
    /// Level the snapshot was taken at
    pub level: Level,
    pub first_level: Level,
    pub last_level: Level,
    pub total_bakers: i32,
    pub total_delegators: i32,
    pub total_baking_power: Mutez,
    pub total_delegated: Mutez,
    pub total_staked: Mutez,
    pub seed: String,
}

/// Per-baker cycle aggregate.
///
/// Snapshot fields are set when the cycle begins, running totals accumulate
/// as the cycle's blocks are applied.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BakerCycle {
    pub id: RowId,
    pub level: Level,
    pub cycle: CycleIndex,
    pub baker_id: AccountId,
    pub baking_power: Mutez,
    pub own_balance: Mutez,
    pub own_staked: Mutez,
    pub external_delegated: Mutez,
    pub delegators_count: i32,
    pub blocks: i32,
    pub block_rewards: Mutez,
    pub block_bonuses: Mutez,
    pub block_fees: Mutez,
    pub endorsements: i32,
    pub endorsed_slots: i32,
    pub endorsement_rewards: Mutez,
    pub nonce_revelations: i32,
    pub revelation_rewards: Mutez,
    pub revelation_losses: Mutez,
    pub double_signing_rewards: Mutez,
    pub double_signing_losses: Mutez,
    pub dal_attestation_rewards: Mutez,
}

impl BakerCycle {
    pub fn new(id: RowId, level: Level, cycle: CycleIndex, baker_id: AccountId) -> Self {
        Self {
            id,
            level,
            cycle,
            baker_id,
            baking_power: 0,
            own_balance: 0,
            own_staked: 0,
            external_delegated: 0,
            delegators_count: 0,
            blocks: 0,
            block_rewards: 0,
            block_bonuses: 0,
            block_fees: 0,
            endorsements: 0,
            endorsed_slots: 0,
            endorsement_rewards: 0,
            nonce_revelations: 0,
            revelation_rewards: 0,
            revelation_losses: 0,
            double_signing_rewards: 0,
            double_signing_losses: 0,
            dal_attestation_rewards: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DelegatorCycle {
    pub id: RowId,
    pub level: Level,
    pub cycle: CycleIndex,
    pub delegator_id: AccountId,
    pub baker_id: AccountId,
    pub delegated_balance: Mutez,
    pub staked_balance: Mutez,
}

/// Balance of a baker or delegator at a snapshot level.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SnapshotBalance {
    pub id: RowId,
    pub level: Level,
    pub account_id: AccountId,
    pub baker_id: AccountId,
    pub balance: Mutez,
    pub staked_balance: Mutez,
    pub delegated_balance: Mutez,
}

/// Supply figures at the start of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Statistics {
    pub id: RowId,
    pub level: Level,
    pub cycle: CycleIndex,
    pub total_created: Mutez,
    pub total_burned: Mutez,
    pub total_activated: Mutez,
    pub total_frozen: Mutez,
    pub total_rollup_bonds: Mutez,
    pub total_supply: Mutez,
    pub circulating_supply: Mutez,
}
