use postgres_types::FromSql;
use postgres_types::ToSql;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::Level;
use crate::core::types::OperationId;
use crate::core::types::RowId;

/// Big map change reported by the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BigMapDiff {
    Alloc {
        ptr: i64,
        contract: Address,
        #[serde(default)]
        path: String,
        key_type: Value,
        value_type: Value,
    },
    /// Sets a key, or removes it when `value` is none.
    Update {
        ptr: i64,
        key_hash: String,
        key: Value,
        #[serde(default)]
        value: Option<Value>,
    },
    Remove {
        ptr: i64,
    },
}

impl BigMapDiff {
    pub fn ptr(&self) -> i64 {
        match self {
            Self::Alloc { ptr, .. } | Self::Update { ptr, .. } | Self::Remove { ptr } => *ptr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigMap {
    pub id: RowId,
    pub ptr: i64,
    pub contract_id: AccountId,
    pub path: String,
    pub key_type: Value,
    pub value_type: Value,
    pub active: bool,
    pub first_level: Level,
    pub last_level: Level,
    pub total_keys: i32,
    pub active_keys: i32,
    pub updates_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigMapKey {
    pub id: RowId,
    pub big_map_id: RowId,
    pub key_hash: String,
    pub key: Value,
    /// Current value, none once removed.
    pub value: Option<Value>,
    pub active: bool,
    pub first_level: Level,
    pub last_level: Level,
    pub updates_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSql, FromSql)]
#[postgres(name = "big_map_action")]
pub enum BigMapAction {
    #[postgres(name = "allocate")]
    Allocate,
    #[postgres(name = "add_key")]
    AddKey,
    #[postgres(name = "update_key")]
    UpdateKey,
    #[postgres(name = "remove_key")]
    RemoveKey,
    #[postgres(name = "remove")]
    Remove,
}

/// Operation a big map update originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BigMapUpdateCause {
    Origination(OperationId),
    Transaction(OperationId),
    Migration(OperationId),
}

impl BigMapUpdateCause {
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Origination(id) | Self::Transaction(id) | Self::Migration(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigMapUpdate {
    pub id: RowId,
    pub level: Level,
    pub big_map_id: RowId,
    /// Set for key actions
    pub key_id: Option<RowId>,
    pub action: BigMapAction,
    /// Value after the update
    pub value: Option<Value>,
    pub cause: BigMapUpdateCause,
}
