//! Persistence seam of the engine.
//!
//! A store exposes committed state only. All writes of a block, or of a
//! rolled back block, reach it as a single `Changeset` applied atomically.
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::AccountId;
use crate::core::types::Level;
use crate::core::types::OperationId;
use crate::core::types::RowId;
use crate::schema::AppState;
use crate::schema::BigMapUpdate;
use crate::schema::IndexKey;
use crate::schema::Operation;
use crate::schema::Proposal;
use crate::schema::Row;
use crate::schema::RowKey;
use crate::schema::Subject;
use crate::schema::Table;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("injected fault: {detail}")]
    Fault { transient: bool, detail: String },
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[error("unserializable value: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Postgres error codes worth retrying.
const TRANSIENT_SQLSTATES: [&str; 3] = [
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "57P01", // admin_shutdown
];

impl StoreError {
    /// True for errors a retry with the same input may get past.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Postgres(e) => {
                e.is_closed()
                    || e
                        .code()
                        .map(|c| TRANSIENT_SQLSTATES.contains(&c.code()))
                        .unwrap_or(false)
            }
            Self::Fault { transient, .. } => *transient,
            Self::Corrupt(_) | Self::Serde(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Inserts or replaces a row.
    Put(Row),
    Delete(RowKey),
}

/// All writes of a single block application or rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct Changeset {
    /// Level being applied or rolled back
    pub level: Level,
    pub changes: Vec<Change>,
    pub app_state: AppState,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Last committed aggregate state, none for a fresh store.
    async fn app_state(&self) -> Result<Option<AppState>, StoreError>;

    async fn get(&self, key: RowKey) -> Result<Option<Row>, StoreError>;

    /// Resolves a unique secondary key.
    async fn lookup(&self, key: &IndexKey) -> Result<Option<RowKey>, StoreError>;

    /// Operations of a block, in application order.
    async fn operations_at(&self, level: Level) -> Result<Vec<Operation>, StoreError>;

    /// Rows of `table` attached to `level`, ordered by key.
    async fn rows_at(&self, table: Table, level: Level) -> Result<Vec<Row>, StoreError>;

    /// Most recent update of a big map key preceding update `before`.
    async fn previous_big_map_update(
        &self,
        key_id: RowId,
        before: RowId,
    ) -> Result<Option<BigMapUpdate>, StoreError>;

    /// Highest level below `before` at which `subject` saw activity.
    async fn last_activity(
        &self,
        subject: Subject,
        before: Level,
    ) -> Result<Option<Level>, StoreError>;

    /// Ids of accounts registered as delegates.
    async fn delegates(&self) -> Result<Vec<AccountId>, StoreError>;

    /// Ids of accounts delegating to `baker`, the baker itself excluded.
    async fn delegators(&self, baker: AccountId) -> Result<Vec<AccountId>, StoreError>;

    /// Proposals upvoted during an epoch.
    async fn proposals(&self, epoch: i32) -> Result<Vec<Proposal>, StoreError>;

    /// Applies all changes and the new aggregate state, or none of them.
    async fn commit(&self, changeset: Changeset) -> Result<(), StoreError>;
}

/// Operation ids referenced by a log row's cause.
pub fn cause_of(row: &Row) -> Option<OperationId> {
    match row {
        Row::BigMapUpdate(r) => Some(r.cause.operation_id()),
        Row::TicketTransfer(r) => Some(r.cause.operation_id()),
        Row::TokenTransfer(r) => Some(r.cause.operation_id()),
        Row::StakingUpdate(r) => Some(r.cause.operation_id()),
        _ => None,
    }
}
