use postgres_from_row::FromRow;

use super::param;
use super::Param;
use crate::schema::Block;
use crate::schema::Protocol;
use crate::store::StoreError;

pub(super) const BLOCK_COLUMNS: &[&str] = &[
    "level",
    "hash",
    "cycle",
    "timestamp",
    "proto_code",
    "payload_round",
    "proposer_id",
    "producer_id",
    "reward",
    "bonus",
    "fees",
    "operations_count",
    "validations",
];

pub(super) const PROTOCOL_COLUMNS: &[&str] =
    &["code", "hash", "first_level", "first_cycle", "last_level"];

pub(super) fn read_block(row: &tokio_postgres::Row) -> Result<Block, StoreError> {
    Ok(Block::try_from_row(row)?)
}

pub(super) fn block_params(b: &Block) -> Vec<Param> {
    vec![
        param(b.level),
        param(b.hash.clone()),
        param(b.cycle),
        param(b.timestamp),
        param(b.proto_code),
        param(b.payload_round),
        param(b.proposer_id),
        param(b.producer_id),
        param(b.reward),
        param(b.bonus),
        param(b.fees),
        param(b.operations_count),
        param(b.validations),
    ]
}

pub(super) fn read_protocol(row: &tokio_postgres::Row) -> Result<Protocol, StoreError> {
    Ok(Protocol::try_from_row(row)?)
}

pub(super) fn protocol_params(p: &Protocol) -> Vec<Param> {
    vec![
        param(p.code),
        param(p.hash.clone()),
        param(p.first_level),
        param(p.first_cycle),
        param(p.last_level),
    ]
}
