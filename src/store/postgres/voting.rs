use postgres_from_row::FromRow;

use super::param;
use super::Param;
use crate::schema::Proposal;
use crate::schema::VotingPeriod;
use crate::schema::VotingSnapshot;
use crate::store::StoreError;

pub(super) const PERIOD_COLUMNS: &[&str] = &[
    "index",
    "level",
    "epoch",
    "kind",
    "first_level",
    "last_level",
    "status",
    "total_bakers",
    "total_voting_power",
    "proposals_count",
    "top_upvotes",
    "top_voting_power",
    "participation_power",
    "yay_ballots",
    "yay_voting_power",
    "nay_ballots",
    "nay_voting_power",
    "pass_ballots",
    "pass_voting_power",
];

pub(super) const SNAPSHOT_COLUMNS: &[&str] =
    &["id", "level", "period", "baker_id", "voting_power", "status"];

pub(super) const PROPOSAL_COLUMNS: &[&str] = &[
    "id",
    "epoch",
    "hash",
    "initiator_id",
    "first_period",
    "first_level",
    "last_level",
    "upvotes",
    "voting_power",
];

pub(super) fn read_period(row: &tokio_postgres::Row) -> Result<VotingPeriod, StoreError> {
    Ok(VotingPeriod::try_from_row(row)?)
}

pub(super) fn period_params(p: &VotingPeriod) -> Vec<Param> {
    vec![
        param(p.index),
        param(p.level),
        param(p.epoch),
        param(p.kind),
        param(p.first_level),
        param(p.last_level),
        param(p.status),
        param(p.total_bakers),
        param(p.total_voting_power),
        param(p.proposals_count),
        param(p.top_upvotes),
        param(p.top_voting_power),
        param(p.participation_power),
        param(p.yay_ballots),
        param(p.yay_voting_power),
        param(p.nay_ballots),
        param(p.nay_voting_power),
        param(p.pass_ballots),
        param(p.pass_voting_power),
    ]
}

pub(super) fn read_snapshot(row: &tokio_postgres::Row) -> Result<VotingSnapshot, StoreError> {
    Ok(VotingSnapshot::try_from_row(row)?)
}

pub(super) fn snapshot_params(s: &VotingSnapshot) -> Vec<Param> {
    vec![
        param(s.id),
        param(s.level),
        param(s.period),
        param(s.baker_id),
        param(s.voting_power),
        param(s.status),
    ]
}

pub(super) fn read_proposal(row: &tokio_postgres::Row) -> Result<Proposal, StoreError> {
    Ok(Proposal::try_from_row(row)?)
}

pub(super) fn proposal_params(p: &Proposal) -> Vec<Param> {
    vec![
        param(p.id),
        param(p.epoch),
        param(p.hash.clone()),
        param(p.initiator_id),
        param(p.first_period),
        param(p.first_level),
        param(p.last_level),
        param(p.upvotes),
        param(p.voting_power),
    ]
}
