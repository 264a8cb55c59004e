use tokio_postgres::Client;

use super::param;
use super::Param;
use crate::core::types::RowId;
use crate::schema::BigMap;
use crate::schema::BigMapKey;
use crate::schema::BigMapUpdate;
use crate::schema::BigMapUpdateCause;
use crate::store::StoreError;

pub(super) const BIG_MAP_COLUMNS: &[&str] = &[
    "id",
    "ptr",
    "contract_id",
    "path",
    "key_type",
    "value_type",
    "active",
    "first_level",
    "last_level",
    "total_keys",
    "active_keys",
    "updates_count",
];

pub(super) const KEY_COLUMNS: &[&str] = &[
    "id",
    "big_map_id",
    "key_hash",
    "key",
    "value",
    "active",
    "first_level",
    "last_level",
    "updates_count",
];

pub(super) const UPDATE_COLUMNS: &[&str] = &[
    "id",
    "level",
    "big_map_id",
    "key_id",
    "action",
    "value",
    "origination_id",
    "transaction_id",
    "migration_id",
];

pub(super) fn read_big_map(row: &tokio_postgres::Row) -> Result<BigMap, StoreError> {
    Ok(BigMap {
        id: row.try_get("id")?,
        ptr: row.try_get("ptr")?,
        contract_id: row.try_get("contract_id")?,
        path: row.try_get("path")?,
        key_type: row.try_get("key_type")?,
        value_type: row.try_get("value_type")?,
        active: row.try_get("active")?,
        first_level: row.try_get("first_level")?,
        last_level: row.try_get("last_level")?,
        total_keys: row.try_get("total_keys")?,
        active_keys: row.try_get("active_keys")?,
        updates_count: row.try_get("updates_count")?,
    })
}

pub(super) fn big_map_params(m: &BigMap) -> Vec<Param> {
    vec![
        param(m.id),
        param(m.ptr),
        param(m.contract_id),
        param(m.path.clone()),
        param(m.key_type.clone()),
        param(m.value_type.clone()),
        param(m.active),
        param(m.first_level),
        param(m.last_level),
        param(m.total_keys),
        param(m.active_keys),
        param(m.updates_count),
    ]
}

pub(super) fn read_key(row: &tokio_postgres::Row) -> Result<BigMapKey, StoreError> {
    Ok(BigMapKey {
        id: row.try_get("id")?,
        big_map_id: row.try_get("big_map_id")?,
        key_hash: row.try_get("key_hash")?,
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        active: row.try_get("active")?,
        first_level: row.try_get("first_level")?,
        last_level: row.try_get("last_level")?,
        updates_count: row.try_get("updates_count")?,
    })
}

pub(super) fn key_params(k: &BigMapKey) -> Vec<Param> {
    vec![
        param(k.id),
        param(k.big_map_id),
        param(k.key_hash.clone()),
        param(k.key.clone()),
        param(k.value.clone()),
        param(k.active),
        param(k.first_level),
        param(k.last_level),
        param(k.updates_count),
    ]
}

pub(super) fn read_update(row: &tokio_postgres::Row) -> Result<BigMapUpdate, StoreError> {
    let origination: Option<i64> = row.try_get("origination_id")?;
    let transaction: Option<i64> = row.try_get("transaction_id")?;
    let migration: Option<i64> = row.try_get("migration_id")?;
    let cause = match (origination, transaction, migration) {
        (Some(id), None, None) => BigMapUpdateCause::Origination(id),
        (None, Some(id), None) => BigMapUpdateCause::Transaction(id),
        (None, None, Some(id)) => BigMapUpdateCause::Migration(id),
        _ => return Err(StoreError::Corrupt(String::from("ambiguous big map update cause"))),
    };
    Ok(BigMapUpdate {
        id: row.try_get("id")?,
        level: row.try_get("level")?,
        big_map_id: row.try_get("big_map_id")?,
        key_id: row.try_get("key_id")?,
        action: row.try_get("action")?,
        value: row.try_get("value")?,
        cause,
    })
}

pub(super) fn update_params(u: &BigMapUpdate) -> Vec<Param> {
    let (origination, transaction, migration) = match u.cause {
        BigMapUpdateCause::Origination(id) => (Some(id), None, None),
        BigMapUpdateCause::Transaction(id) => (None, Some(id), None),
        BigMapUpdateCause::Migration(id) => (None, None, Some(id)),
    };
    vec![
        param(u.id),
        param(u.level),
        param(u.big_map_id),
        param(u.key_id),
        param(u.action),
        param(u.value.clone()),
        param(origination),
        param(transaction),
        param(migration),
    ]
}

pub(super) async fn previous_update(
    client: &Client,
    key_id: RowId,
    before: RowId,
) -> Result<Option<BigMapUpdate>, StoreError> {
    let qry = format!(
        "
        select {}
        from tz.big_map_updates
        where key_id = $1 and id < $2
        order by id desc
        limit 1;",
        UPDATE_COLUMNS.join(", ")
    );
    match client.query_opt(&qry, &[&key_id, &before]).await? {
        Some(row) => Ok(Some(read_update(&row)?)),
        None => Ok(None),
    }
}
