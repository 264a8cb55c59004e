//! Staking ledger: updates moving funds between the staked and unstaked buckets.
use super::accounts;
use super::error::Inconsistency;
use super::error::MutationError;
use super::unit::Unit;
use super::Direction;
use crate::core::types::AccountId;
use crate::core::types::Cycle;
use crate::core::types::Mutez;
use crate::schema::Counter;
use crate::schema::IndexKey;
use crate::schema::RowKey;
use crate::schema::StakingUpdate;
use crate::schema::StakingUpdateCause;
use crate::schema::StakingUpdateKind;
use crate::schema::Subject;
use crate::schema::UnstakeRequest;
use crate::store::Store;

/// A staking movement about to be recorded.
#[derive(Debug, Clone, Copy)]
pub(super) struct Movement {
    pub kind: StakingUpdateKind,
    pub staker: AccountId,
    pub baker: AccountId,
    pub amount: Mutez,
    /// Cycle of the unstake request involved, for kinds that use one
    pub request_cycle: Cycle,
}

/// Appends a staking update and folds it into balances and its unstake request.
pub(super) async fn record<S: Store>(
    unit: &mut Unit<'_, S>,
    movement: Movement,
    cause: StakingUpdateCause,
) -> Result<(), MutationError> {
    let Movement {
        kind,
        staker,
        baker,
        amount,
        request_cycle,
    } = movement;
    let request_id = match kind.uses_request() {
        true => {
            let key = IndexKey::UnstakeRequest {
                cycle: request_cycle,
                baker_id: baker,
                staker_id: staker,
            };
            let mut request = match unit.find::<UnstakeRequest>(&key).await? {
                Some(request) => request,
                None if kind == StakingUpdateKind::Unstake => UnstakeRequest {
                    id: unit.allocate(Counter::UnstakeRequest),
                    cycle: request_cycle,
                    baker_id: baker,
                    staker_id: staker,
                    first_level: unit.level,
                    last_level: unit.level,
                    requested: 0,
                    restaked: 0,
                    finalized: 0,
                    slashed: 0,
                    updates_count: 0,
                },
                None => {
                    return Err(unit.fail(Inconsistency::InvalidInput(format!(
                        "{kind:?} of account {staker} without unstake request for cycle {request_cycle}"
                    ))))
                }
            };
            fold_request(&mut request, kind, amount);
            request.updates_count += 1;
            request.last_level = unit.level;
            let id = request.id;
            unit.put(request);
            Some(id)
        }
        false => None,
    };
    fold_account(unit, staker, kind, amount, Direction::Apply).await?;
    let id = unit.allocate(Counter::StakingUpdate);
    unit.put(StakingUpdate {
        id,
        level: unit.level,
        cycle: unit.app.cycle,
        baker_id: baker,
        staker_id: staker,
        kind,
        amount,
        request_id,
        cause,
    });
    Ok(())
}

/// Reverses a recorded update and removes it.
pub(super) async fn unfold<S: Store>(
    unit: &mut Unit<'_, S>,
    update: &StakingUpdate,
) -> Result<(), MutationError> {
    fold_account(unit, update.staker_id, update.kind, update.amount, Direction::Revert).await?;
    if let Some(request_id) = update.request_id {
        let mut request: UnstakeRequest = unit.require(RowKey::UnstakeRequest(request_id)).await?;
        fold_request(&mut request, update.kind, -update.amount);
        request.updates_count -= 1;
        if request.updates_count == 0 {
            unit.drop_row(RowKey::UnstakeRequest(request_id), Counter::UnstakeRequest)
                .await?;
        } else {
            unit.put(request);
            unit.touch(Subject::UnstakeRequest(request_id));
        }
    }
    unit.drop_row(RowKey::StakingUpdate(update.id), Counter::StakingUpdate)
        .await
}

fn fold_request(request: &mut UnstakeRequest, kind: StakingUpdateKind, amount: Mutez) {
    match kind {
        StakingUpdateKind::Unstake => request.requested += amount,
        StakingUpdateKind::Restake => request.restaked += amount,
        StakingUpdateKind::Finalize => request.finalized += amount,
        StakingUpdateKind::SlashUnstaked => request.slashed += amount,
        StakingUpdateKind::Stake | StakingUpdateKind::SlashStaked => (),
    }
}

/// Moves `amount` between a staker's buckets.
async fn fold_account<S: Store>(
    unit: &mut Unit<'_, S>,
    staker: AccountId,
    kind: StakingUpdateKind,
    amount: Mutez,
    dir: Direction,
) -> Result<(), MutationError> {
    let amount = dir.sign() * amount;
    let mut account = accounts::get(unit, staker).await?;
    let mut slashed = 0;
    match kind {
        StakingUpdateKind::Stake => {
            account.staked_balance += amount;
            unit.app.total_frozen += amount;
        }
        StakingUpdateKind::Unstake => {
            account.staked_balance -= amount;
            account.unstaked_balance += amount;
        }
        StakingUpdateKind::Restake => {
            account.unstaked_balance -= amount;
            account.staked_balance += amount;
        }
        StakingUpdateKind::Finalize => {
            account.unstaked_balance -= amount;
            unit.app.total_frozen -= amount;
        }
        StakingUpdateKind::SlashStaked => {
            account.staked_balance -= amount;
            slashed = amount;
        }
        StakingUpdateKind::SlashUnstaked => {
            account.unstaked_balance -= amount;
            slashed = amount;
        }
    }
    account.staking_updates_count += dir.step();
    if account.staked_balance < 0 || account.unstaked_balance < 0 {
        return Err(unit.fail(Inconsistency::NegativeBalance(RowKey::Account(staker))));
    }
    unit.put(account);
    if slashed != 0 {
        unit.app.total_frozen -= slashed;
        unit.app.total_burned += slashed;
        accounts::change_balance(unit, staker, -slashed).await?;
    }
    Ok(())
}
