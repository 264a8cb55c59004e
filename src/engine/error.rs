use thiserror::Error;

use crate::core::types::BlockHash;
use crate::core::types::Level;
use crate::schema::Counter;
use crate::schema::OperationKind;
use crate::schema::RowKey;
use crate::store::StoreError;

/// Failure of a block application or rollback.
///
/// Nothing is committed when one is returned.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("inconsistency at level {level}: {kind}")]
    Consistency { level: Level, kind: Inconsistency },
}

impl MutationError {
    /// True if retrying the same mutation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Consistency { .. } => false,
        }
    }
}

/// State that contradicts the block being applied or rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    #[error("missing row {0}")]
    MissingRow(RowKey),
    #[error("row {0} already exists")]
    DuplicateRow(RowKey),
    #[error("expected level {expected}, got {got}")]
    UnexpectedLevel { expected: Level, got: Level },
    #[error("predecessor {got} does not match head {expected}")]
    PredecessorMismatch { expected: BlockHash, got: BlockHash },
    #[error("{0:?} counter would become negative")]
    CounterUnderflow(Counter),
    #[error("{kind} count of account {account} would become negative")]
    OpsCountUnderflow { kind: OperationKind, account: i64 },
    #[error("releasing {counter:?} id {id} while last issued id is {last}")]
    NonLifoRelease { counter: Counter, id: i64, last: i64 },
    #[error("balance of {0} would become negative")]
    NegativeBalance(RowKey),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
