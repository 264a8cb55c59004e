use postgres_from_row::FromRow;

use super::param;
use super::Param;
use crate::schema::BakerCycle;
use crate::schema::Cycle;
use crate::schema::DelegatorCycle;
use crate::schema::SnapshotBalance;
use crate::schema::Statistics;
use crate::store::StoreError;

pub(super) const CYCLE_COLUMNS: &[&str] = &[
    "index",
    "level",
    "first_level",
    "last_level",
    "total_bakers",
    "total_delegators",
    "total_baking_power",
    "total_delegated",
    "total_staked",
    "seed",
];

pub(super) const BAKER_COLUMNS: &[&str] = &[
    "id",
    "level",
    "cycle",
    "baker_id",
    "baking_power",
    "own_balance",
    "own_staked",
    "external_delegated",
    "delegators_count",
    "blocks",
    "block_rewards",
    "block_bonuses",
    "block_fees",
    "endorsements",
    "endorsed_slots",
    "endorsement_rewards",
    "nonce_revelations",
    "revelation_rewards",
    "revelation_losses",
    "double_signing_rewards",
    "double_signing_losses",
    "dal_attestation_rewards",
];

pub(super) const DELEGATOR_COLUMNS: &[&str] = &[
    "id",
    "level",
    "cycle",
    "delegator_id",
    "baker_id",
    "delegated_balance",
    "staked_balance",
];

pub(super) const SNAPSHOT_COLUMNS: &[&str] = &[
    "id",
    "level",
    "account_id",
    "baker_id",
    "balance",
    "staked_balance",
    "delegated_balance",
];

pub(super) const STATISTICS_COLUMNS: &[&str] = &[
    "id",
    "level",
    "cycle",
    "total_created",
    "total_burned",
    "total_activated",
    "total_frozen",
    "total_rollup_bonds",
    "total_supply",
    "circulating_supply",
];

pub(super) fn read_cycle(row: &tokio_postgres::Row) -> Result<Cycle, StoreError> {
    Ok(Cycle::try_from_row(row)?)
}

pub(super) fn cycle_params(c: &Cycle) -> Vec<Param> {
    vec![
        param(c.index),
        param(c.level),
        param(c.first_level),
        param(c.last_level),
        param(c.total_bakers),
        param(c.total_delegators),
        param(c.total_baking_power),
        param(c.total_delegated),
        param(c.total_staked),
        param(c.seed.clone()),
    ]
}

pub(super) fn read_baker_cycle(row: &tokio_postgres::Row) -> Result<BakerCycle, StoreError> {
    Ok(BakerCycle::try_from_row(row)?)
}

pub(super) fn baker_cycle_params(b: &BakerCycle) -> Vec<Param> {
    vec![
        param(b.id),
        param(b.level),
        param(b.cycle),
        param(b.baker_id),
        param(b.baking_power),
        param(b.own_balance),
        param(b.own_staked),
        param(b.external_delegated),
        param(b.delegators_count),
        param(b.blocks),
        param(b.block_rewards),
        param(b.block_bonuses),
        param(b.block_fees),
        param(b.endorsements),
        param(b.endorsed_slots),
        param(b.endorsement_rewards),
        param(b.nonce_revelations),
        param(b.revelation_rewards),
        param(b.revelation_losses),
        param(b.double_signing_rewards),
        param(b.double_signing_losses),
        param(b.dal_attestation_rewards),
    ]
}

pub(super) fn read_delegator_cycle(
    row: &tokio_postgres::Row,
) -> Result<DelegatorCycle, StoreError> {
    Ok(DelegatorCycle::try_from_row(row)?)
}

pub(super) fn delegator_cycle_params(d: &DelegatorCycle) -> Vec<Param> {
    vec![
        param(d.id),
        param(d.level),
        param(d.cycle),
        param(d.delegator_id),
        param(d.baker_id),
        param(d.delegated_balance),
        param(d.staked_balance),
    ]
}

pub(super) fn read_snapshot(row: &tokio_postgres::Row) -> Result<SnapshotBalance, StoreError> {
    Ok(SnapshotBalance::try_from_row(row)?)
}

pub(super) fn snapshot_params(s: &SnapshotBalance) -> Vec<Param> {
    vec![
        param(s.id),
        param(s.level),
        param(s.account_id),
        param(s.baker_id),
        param(s.balance),
        param(s.staked_balance),
        param(s.delegated_balance),
    ]
}

pub(super) fn read_statistics(row: &tokio_postgres::Row) -> Result<Statistics, StoreError> {
    Ok(Statistics::try_from_row(row)?)
}

pub(super) fn statistics_params(s: &Statistics) -> Vec<Param> {
    vec![
        param(s.id),
        param(s.level),
        param(s.cycle),
        param(s.total_created),
        param(s.total_burned),
        param(s.total_activated),
        param(s.total_frozen),
        param(s.total_rollup_bonds),
        param(s.total_supply),
        param(s.circulating_supply),
    ]
}
