//! Cycle snapshots taken at cycle boundaries and per-baker running totals.
use super::accounts;
use super::error::Inconsistency;
use super::error::MutationError;
use super::unit::Unit;
use super::Direction;
use crate::core::types::AccountId;
use crate::core::types::BlockHash;
use crate::core::types::ChainConstants;
use crate::ledger;
use crate::schema::BakerCycle;
use crate::schema::Counter;
use crate::schema::Cycle;
use crate::schema::DelegatorCycle;
use crate::schema::IndexKey;
use crate::schema::RowKey;
use crate::schema::SnapshotBalance;
use crate::schema::Statistics;
use crate::store::Store;

/// Opens the cycle of the current level, snapshotting supply and baking rights.
pub(super) async fn begin<S: Store>(
    unit: &mut Unit<'_, S>,
    constants: &ChainConstants,
    seed: &BlockHash,
) -> Result<(), MutationError> {
    let level = unit.level;
    let index = constants.cycle_of(level);
    tracing::debug!("opening cycle {index} at level {level}");

    let app = &unit.app;
    let stats = Statistics {
        id: 0,
        level,
        cycle: index,
        total_created: app.total_created,
        total_burned: app.total_burned,
        total_activated: app.total_activated,
        total_frozen: app.total_frozen,
        total_rollup_bonds: app.total_rollup_bonds,
        total_supply: app.total_supply(),
        circulating_supply: app.circulating_supply(),
    };
    let id = unit.allocate(Counter::Statistics);
    unit.put(Statistics { id, ..stats });

    let mut cycle = Cycle {
        index,
        level,
        first_level: index * constants.blocks_per_cycle,
        last_level: (index + 1) * constants.blocks_per_cycle - 1,
        total_bakers: 0,
        total_delegators: 0,
        total_baking_power: 0,
        total_delegated: 0,
        total_staked: 0,
        seed: seed.clone(),
    };

    for baker_id in unit.store().delegates().await? {
        let baker = accounts::get(unit, baker_id).await?;
        if baker.staking_balance() < constants.min_baker_stake {
            continue;
        }
        let delegators = unit.store().delegators(baker_id).await?;
        let mut bc = BakerCycle::new(unit.allocate(Counter::BakerCycle), level, index, baker_id);
        bc.baking_power = baker.staking_balance();
        bc.own_balance = baker.balance;
        bc.own_staked = baker.staked_balance;
        bc.external_delegated = baker.delegated_balance;
        bc.delegators_count = delegators.len() as i32;

        cycle.total_bakers += 1;
        cycle.total_delegators += bc.delegators_count;
        cycle.total_baking_power += bc.baking_power;
        cycle.total_delegated += bc.external_delegated;
        cycle.total_staked += bc.own_staked;
        unit.put(bc);
        snapshot_balance(unit, baker_id, baker_id).await?;

        for delegator_id in delegators {
            let delegator = accounts::get(unit, delegator_id).await?;
            let id = unit.allocate(Counter::DelegatorCycle);
            unit.put(DelegatorCycle {
                id,
                level,
                cycle: index,
                delegator_id,
                baker_id,
                delegated_balance: delegator.balance,
                staked_balance: delegator.staked_balance,
            });
            cycle.total_staked += delegator.staked_balance;
            snapshot_balance(unit, delegator_id, baker_id).await?;
        }
    }

    unit.put(cycle);
    ledger::increment(&mut unit.app, Counter::Cycle);
    unit.app.cycle = index;
    Ok(())
}

async fn snapshot_balance<S: Store>(
    unit: &mut Unit<'_, S>,
    account_id: AccountId,
    baker_id: AccountId,
) -> Result<(), MutationError> {
    let account = accounts::get(unit, account_id).await?;
    let id = unit.allocate(Counter::SnapshotBalance);
    unit.put(SnapshotBalance {
        id,
        level: unit.level,
        account_id,
        baker_id,
        balance: account.balance,
        staked_balance: account.staked_balance,
        delegated_balance: account.delegated_balance,
    });
    Ok(())
}

/// Drops snapshot rows taken at the current level, and the cycle opened there if any.
///
/// Baker cycles created on the fly by the level's activity go as well.
pub(super) async fn revert<S: Store>(unit: &mut Unit<'_, S>) -> Result<(), MutationError> {
    for row in unit.rows_at::<SnapshotBalance>().await?.into_iter().rev() {
        unit.drop_row(RowKey::SnapshotBalance(row.id), Counter::SnapshotBalance)
            .await?;
    }
    for row in unit.rows_at::<DelegatorCycle>().await?.into_iter().rev() {
        unit.drop_row(RowKey::DelegatorCycle(row.id), Counter::DelegatorCycle)
            .await?;
    }
    for row in unit.rows_at::<BakerCycle>().await?.into_iter().rev() {
        unit.drop_row(RowKey::BakerCycle(row.id), Counter::BakerCycle)
            .await?;
    }
    for row in unit.rows_at::<Statistics>().await?.into_iter().rev() {
        unit.drop_row(RowKey::Statistics(row.id), Counter::Statistics)
            .await?;
    }
    for cycle in unit.rows_at::<Cycle>().await? {
        tracing::debug!("dropping cycle {} opened at level {}", cycle.index, unit.level);
        unit.delete(RowKey::Cycle(cycle.index)).await?;
        let res = ledger::decrement(&mut unit.app, Counter::Cycle);
        unit.check(res)?;
    }
    Ok(())
}

/// Running totals of a baker for the current cycle.
///
/// Applying creates the row when the baker had no rights at the cycle's start.
pub(super) async fn baker_cycle<S: Store>(
    unit: &mut Unit<'_, S>,
    baker_id: AccountId,
    dir: Direction,
) -> Result<BakerCycle, MutationError> {
    let cycle = unit.app.cycle;
    let key = IndexKey::BakerCycle { cycle, baker_id };
    if let Some(bc) = unit.find::<BakerCycle>(&key).await? {
        return Ok(bc);
    }
    match dir {
        Direction::Apply => {
            let id = unit.allocate(Counter::BakerCycle);
            Ok(BakerCycle::new(id, unit.level, cycle, baker_id))
        }
        Direction::Revert => Err(unit.fail(Inconsistency::InvalidInput(format!(
            "no cycle {cycle} totals for baker {baker_id}"
        )))),
    }
}

/// Applies `f` to the current cycle totals of a baker.
pub(super) async fn update_baker<S: Store, F: FnOnce(&mut BakerCycle) + Send>(
    unit: &mut Unit<'_, S>,
    baker_id: AccountId,
    dir: Direction,
    f: F,
) -> Result<(), MutationError> {
    let mut bc = baker_cycle(unit, baker_id, dir).await?;
    f(&mut bc);
    unit.put(bc);
    Ok(())
}
