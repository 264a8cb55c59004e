use postgres_from_row::FromRow;
use postgres_types::FromSql;
use postgres_types::ToSql;

use crate::core::types::AccountId;
use crate::core::types::Cycle;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::OperationId;
use crate::core::types::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSql, FromSql)]
#[postgres(name = "staking_update_kind")]
pub enum StakingUpdateKind {
    #[postgres(name = "stake")]
    Stake,
    #[postgres(name = "unstake")]
    Unstake,
    #[postgres(name = "restake")]
    Restake,
    #[postgres(name = "finalize")]
    Finalize,
    #[postgres(name = "slash_staked")]
    SlashStaked,
    #[postgres(name = "slash_unstaked")]
    SlashUnstaked,
}

impl StakingUpdateKind {
    /// Updates attached to an unstake request.
    pub fn uses_request(&self) -> bool {
        matches!(
            self,
            Self::Unstake | Self::Restake | Self::Finalize | Self::SlashUnstaked
        )
    }
}

/// Operation a staking update originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StakingUpdateCause {
    Staking(OperationId),
    Autostaking(OperationId),
    DoubleBaking(OperationId),
    DoubleEndorsing(OperationId),
    DoublePreendorsing(OperationId),
}

impl StakingUpdateCause {
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Staking(id)
            | Self::Autostaking(id)
            | Self::DoubleBaking(id)
            | Self::DoubleEndorsing(id)
            | Self::DoublePreendorsing(id) => *id,
        }
    }
}

/// Movement between the spendable, staked and unstaked buckets of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingUpdate {
    pub id: RowId,
    pub level: Level,
    pub cycle: Cycle,
    pub baker_id: AccountId,
    pub staker_id: AccountId,
    pub kind: StakingUpdateKind,
    pub amount: Mutez,
    pub request_id: Option<RowId>,
    pub cause: StakingUpdateCause,
}

/// Unstaked funds of a staker for a given baker and cycle.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UnstakeRequest {
    pub id: RowId,
    pub cycle: Cycle,
    pub baker_id: AccountId,
    pub staker_id: AccountId,
    pub first_level: Level,
    pub last_level: Level,
    pub requested: Mutez,
    pub restaked: Mutez,
    pub finalized: Mutez,
    pub slashed: Mutez,
    pub updates_count: i32,
}

impl UnstakeRequest {
    /// Amount still pending.
    pub fn remaining(&self) -> Mutez {
        self.requested - self.restaked - self.finalized - self.slashed
    }
}
