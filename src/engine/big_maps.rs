//! Big maps: current keys folded from the update log.
use super::accounts;
use super::error::Inconsistency;
use super::error::MutationError;
use super::unit::Unit;
use crate::schema::BigMap;
use crate::schema::BigMapAction;
use crate::schema::BigMapDiff;
use crate::schema::BigMapKey;
use crate::schema::BigMapUpdate;
use crate::schema::BigMapUpdateCause;
use crate::schema::Counter;
use crate::schema::IndexKey;
use crate::schema::RowKey;
use crate::schema::Subject;
use crate::store::Store;

async fn by_ptr<S: Store>(unit: &mut Unit<'_, S>, ptr: i64) -> Result<BigMap, MutationError> {
    match unit.find::<BigMap>(&IndexKey::BigMapPtr(ptr)).await? {
        Some(big_map) => Ok(big_map),
        None => Err(unit.fail(Inconsistency::InvalidInput(format!(
            "unknown big map pointer {ptr}"
        )))),
    }
}

fn log<S: Store>(
    unit: &mut Unit<'_, S>,
    big_map: &BigMap,
    key_id: Option<i64>,
    action: BigMapAction,
    value: Option<serde_json::Value>,
    cause: BigMapUpdateCause,
) {
    let id = unit.allocate(Counter::BigMapUpdate);
    unit.put(BigMapUpdate {
        id,
        level: unit.level,
        big_map_id: big_map.id,
        key_id,
        action,
        value,
        cause,
    });
}

/// Applies a diff and appends the matching update.
pub(super) async fn apply<S: Store>(
    unit: &mut Unit<'_, S>,
    diff: &BigMapDiff,
    cause: BigMapUpdateCause,
) -> Result<(), MutationError> {
    let level = unit.level;
    match diff {
        BigMapDiff::Alloc {
            ptr,
            contract,
            path,
            key_type,
            value_type,
        } => {
            if let Some(existing) = unit.lookup(&IndexKey::BigMapPtr(*ptr)).await? {
                return Err(unit.fail(Inconsistency::DuplicateRow(existing)));
            }
            let contract_id = accounts::resolve(unit, contract).await?;
            let big_map = BigMap {
                id: unit.allocate(Counter::BigMap),
                ptr: *ptr,
                contract_id,
                path: path.clone(),
                key_type: key_type.clone(),
                value_type: value_type.clone(),
                active: true,
                first_level: level,
                last_level: level,
                total_keys: 0,
                active_keys: 0,
                updates_count: 1,
            };
            log(unit, &big_map, None, BigMapAction::Allocate, None, cause);
            unit.put(big_map);
        }
        BigMapDiff::Update {
            ptr,
            key_hash,
            key,
            value,
        } => {
            let mut big_map = by_ptr(unit, *ptr).await?;
            let index_key = IndexKey::BigMapKey {
                big_map_id: big_map.id,
                key_hash: key_hash.clone(),
            };
            let (mut row, was_active) = match unit.find::<BigMapKey>(&index_key).await? {
                Some(row) => {
                    let active = row.active;
                    (row, Some(active))
                }
                None => {
                    big_map.total_keys += 1;
                    let row = BigMapKey {
                        id: unit.allocate(Counter::BigMapKey),
                        big_map_id: big_map.id,
                        key_hash: key_hash.clone(),
                        key: key.clone(),
                        value: None,
                        active: false,
                        first_level: level,
                        last_level: level,
                        updates_count: 0,
                    };
                    (row, None)
                }
            };
            let action = match (was_active, value.is_some()) {
                (_, false) => BigMapAction::RemoveKey,
                (Some(true), true) => BigMapAction::UpdateKey,
                (_, true) => BigMapAction::AddKey,
            };
            row.value = value.clone();
            row.active = value.is_some();
            row.updates_count += 1;
            row.last_level = level;
            big_map.active_keys += row.active as i32 - was_active.unwrap_or(false) as i32;
            big_map.updates_count += 1;
            big_map.last_level = level;
            log(unit, &big_map, Some(row.id), action, value.clone(), cause);
            unit.put(row);
            unit.put(big_map);
        }
        BigMapDiff::Remove { ptr } => {
            let mut big_map = by_ptr(unit, *ptr).await?;
            big_map.active = false;
            big_map.updates_count += 1;
            big_map.last_level = level;
            log(unit, &big_map, None, BigMapAction::Remove, None, cause);
            unit.put(big_map);
        }
    }
    Ok(())
}

/// Reverses an update and removes it.
///
/// Overwritten key values come back from the key's previous update.
pub(super) async fn unfold<S: Store>(
    unit: &mut Unit<'_, S>,
    update: &BigMapUpdate,
) -> Result<(), MutationError> {
    let mut big_map: BigMap = unit.require(RowKey::BigMap(update.big_map_id)).await?;
    big_map.updates_count -= 1;
    unit.drop_row(RowKey::BigMapUpdate(update.id), Counter::BigMapUpdate)
        .await?;
    match (update.action, update.key_id) {
        (BigMapAction::Allocate, _) => {
            if big_map.updates_count != 0 {
                return Err(unit.fail(Inconsistency::InvalidInput(format!(
                    "big map {} still has updates when rolling back its allocation",
                    big_map.id
                ))));
            }
            unit.drop_row(RowKey::BigMap(big_map.id), Counter::BigMap)
                .await?;
            return Ok(());
        }
        (BigMapAction::Remove, _) => big_map.active = true,
        (_, Some(key_id)) => {
            let mut row: BigMapKey = unit.require(RowKey::BigMapKey(key_id)).await?;
            let was_active = row.active;
            row.updates_count -= 1;
            if row.updates_count == 0 {
                unit.drop_row(RowKey::BigMapKey(key_id), Counter::BigMapKey)
                    .await?;
                big_map.total_keys -= 1;
                big_map.active_keys -= was_active as i32;
            } else {
                let previous = unit
                    .store()
                    .previous_big_map_update(key_id, update.id)
                    .await?;
                let Some(previous) = previous else {
                    return Err(unit.fail(Inconsistency::InvalidInput(format!(
                        "no update of big map key {key_id} before {}",
                        update.id
                    ))));
                };
                row.active = previous.value.is_some();
                row.value = previous.value;
                big_map.active_keys += row.active as i32 - was_active as i32;
                unit.put(row);
                unit.touch(Subject::BigMapKey(key_id));
            }
        }
        (action, None) => {
            return Err(unit.fail(Inconsistency::InvalidInput(format!(
                "{action:?} update {} without key",
                update.id
            ))))
        }
    }
    unit.put(big_map);
    unit.touch(Subject::BigMap(update.big_map_id));
    Ok(())
}
