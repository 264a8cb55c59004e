//! Block-level mutations of the index.
//!
//! Applying a block and rolling back the head are each computed in a single
//! unit of work and committed as one changeset: a failure leaves the store
//! exactly as it was.
mod accounts;
pub mod audit;
mod big_maps;
mod blocks;
mod cycles;
mod error;
mod operations;
mod staking;
mod tickets;
mod tokens;
mod unit;
mod voting;

pub use error::Inconsistency;
pub use error::MutationError;

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::constants::ACCOUNT_CACHE_SIZE;
use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::BlockHash;
use crate::core::types::ChainConstants;
use crate::core::types::Head;
use crate::core::types::Level;
use crate::schema::AppState;
use crate::schema::Block;
use crate::schema::DecodedBlock;
use crate::schema::Row;
use crate::schema::RowKey;
use crate::store::Store;
use operations::Logs;
use unit::Unit;

/// Whether a mutation is being applied or rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Apply,
    Revert,
}

impl Direction {
    /// Factor of amounts moved in this direction.
    pub fn sign(&self) -> i64 {
        match self {
            Self::Apply => 1,
            Self::Revert => -1,
        }
    }

    /// Increment of counts in this direction.
    pub fn step(&self) -> i32 {
        self.sign() as i32
    }
}

pub struct Engine<S: Store> {
    store: S,
    constants: ChainConstants,
    /// Last committed app state
    app: AppState,
    /// Maps addresses to account ids
    accounts: LruCache<Address, AccountId>,
}

impl<S: Store> Engine<S> {
    pub async fn new(store: S, constants: ChainConstants) -> Result<Self, MutationError> {
        let app = store.app_state().await?.unwrap_or_else(AppState::initial);
        tracing::debug!("engine head: {:?}", app.head());
        let capacity = NonZeroUsize::new(ACCOUNT_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            store,
            constants,
            app,
            accounts: LruCache::new(capacity),
        })
    }

    pub fn head(&self) -> Head {
        self.app.head()
    }

    pub fn app_state(&self) -> &AppState {
        &self.app
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn constants(&self) -> &ChainConstants {
        &self.constants
    }

    /// Hash of the indexed block at `level`, if any.
    pub async fn block_hash(&self, level: Level) -> Result<Option<BlockHash>, MutationError> {
        match self.store.get(RowKey::Block(level)).await? {
            Some(Row::Block(block)) => Ok(Some(block.hash)),
            _ => Ok(None),
        }
    }

    /// Applies a block on top of the current head.
    pub async fn apply_block(&mut self, block: &DecodedBlock) -> Result<(), MutationError> {
        let level = block.level;
        tracing::debug!("applying block {} at level {level}", block.hash);
        let mut unit = Unit::new(&self.store, &self.accounts, self.app.clone(), level);
        let res = blocks::validate(&unit.app, block);
        unit.check(res)?;

        let cycle = self.constants.cycle_of(level);
        blocks::activate_protocol(&mut unit, block, cycle).await?;
        if unit.app.cycle != cycle {
            cycles::begin(&mut unit, &self.constants, &block.hash).await?;
        }
        if unit.app.voting_period != self.constants.voting_period_of(level) {
            voting::begin(&mut unit, &self.constants).await?;
        }
        let row = blocks::insert(&mut unit, block).await?;
        for op in &block.operations {
            operations::apply(&mut unit, &row, op).await?;
        }
        unit.app.level = level;
        unit.app.hash = block.hash.clone();
        unit.app.timestamp = block.timestamp;

        let (changeset, created) = unit.finish();
        let app = changeset.app_state.clone();
        self.store.commit(changeset).await?;
        self.app = app;
        for (address, id) in created {
            self.accounts.put(address, id);
        }
        tracing::debug!("included block {} at level {level}", block.hash);
        Ok(())
    }

    /// Rolls back blocks until the head is at `target` or the index is empty.
    ///
    /// Each level is committed on its own.
    pub async fn rollback_to(&mut self, target: Level) -> Result<(), MutationError> {
        while self.app.level > target && !self.app.head().is_initial() {
            self.revert_head().await?;
        }
        Ok(())
    }

    async fn revert_head(&mut self) -> Result<(), MutationError> {
        let level = self.app.level;
        tracing::debug!("rolling back level {level}");
        let mut unit = Unit::new(&self.store, &self.accounts, self.app.clone(), level);
        let block: Block = unit.require(RowKey::Block(level)).await?;

        let mut logs = Logs::load(&mut unit).await?;
        let ops = self.store.operations_at(level).await?;
        for op in ops.iter().rev() {
            operations::revert(&mut unit, &block, op, &mut logs).await?;
        }
        let orphans = logs.orphans();
        if !orphans.is_empty() {
            return Err(unit.fail(Inconsistency::InvalidInput(format!(
                "log rows of unknown operations {orphans:?}"
            ))));
        }
        blocks::baking(&mut unit, &block, Direction::Revert).await?;
        voting::revert(&mut unit).await?;
        cycles::revert(&mut unit).await?;
        let dropped = accounts::drop_created(&mut unit).await?;
        blocks::revert_protocol(&mut unit).await?;
        blocks::remove(&mut unit).await?;
        unit.restore_last_levels().await?;

        let (changeset, _) = unit.finish();
        let app = changeset.app_state.clone();
        self.store.commit(changeset).await?;
        self.app = app;
        // Ids of dropped accounts get reissued
        self.accounts.clear();
        tracing::info!(
            "rolled back block {} at level {level}, dropping {dropped} accounts",
            block.hash
        );
        Ok(())
    }
}
