//! In-process store keeping every table in ordered maps.
//!
//! Commits build a new version of the tables and swap it in, so readers
//! holding a `snapshot` never observe a partially applied changeset.
//! Faults can be injected to exercise failure paths.
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::RwLock;

use super::Change;
use super::Changeset;
use super::Store;
use super::StoreError;
use crate::core::types::AccountId;
use crate::core::types::Level;
use crate::core::types::RowId;
use crate::schema::AppState;
use crate::schema::BigMapUpdate;
use crate::schema::Entity;
use crate::schema::IndexKey;
use crate::schema::Operation;
use crate::schema::Proposal;
use crate::schema::Row;
use crate::schema::RowKey;
use crate::schema::Subject;
use crate::schema::Table;

/// A consistent version of all tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    app_state: Option<AppState>,
    rows: BTreeMap<Table, BTreeMap<RowKey, Row>>,
    index: BTreeMap<IndexKey, RowKey>,
}

impl Tables {
    pub fn app_state(&self) -> Option<&AppState> {
        self.app_state.as_ref()
    }

    pub fn get(&self, key: RowKey) -> Option<&Row> {
        self.rows.get(&key.table()).and_then(|t| t.get(&key))
    }

    pub fn lookup(&self, key: &IndexKey) -> Option<RowKey> {
        self.index.get(key).copied()
    }

    /// Rows of a table, ordered by key.
    pub fn rows(&self, table: Table) -> impl Iterator<Item = &Row> + '_ {
        self.rows.get(&table).into_iter().flat_map(|t| t.values())
    }

    /// Typed records of a table, ordered by key.
    pub fn all<E: Entity>(&self) -> impl Iterator<Item = &E> + '_ {
        self.rows(E::TABLE).filter_map(E::from_row_ref)
    }

    /// Number of rows in a table.
    pub fn count(&self, table: Table) -> usize {
        self.rows.get(&table).map(|t| t.len()).unwrap_or(0)
    }

    fn put(&mut self, row: Row) {
        let key = row.key();
        for index_key in row.index_keys() {
            self.index.insert(index_key, key);
        }
        let previous = self.rows.entry(key.table()).or_default().insert(key, row);
        if let Some(old) = previous {
            // Drop secondary keys the new version no longer has.
            let current = self.get(key).map(|r| r.index_keys()).unwrap_or_default();
            for index_key in old.index_keys() {
                if !current.contains(&index_key) {
                    self.index.remove(&index_key);
                }
            }
        }
    }

    fn delete(&mut self, key: RowKey) -> Result<Row, StoreError> {
        let table = key.table();
        let row = self
            .rows
            .get_mut(&table)
            .and_then(|t| t.remove(&key))
            .ok_or_else(|| StoreError::Corrupt(format!("deleting missing row {key}")))?;
        if self.rows.get(&table).map(|t| t.is_empty()).unwrap_or(false) {
            self.rows.remove(&table);
        }
        for index_key in row.index_keys() {
            self.index.remove(&index_key);
        }
        Ok(row)
    }

    /// Removes rows still attached to a deleted block.
    fn cascade(&mut self, level: Level) {
        let orphans: Vec<RowKey> = Table::ALL
            .iter()
            .filter(|t| t.cascades())
            .flat_map(|t| self.rows(*t))
            .filter(|r| r.level() == level)
            .map(|r| r.key())
            .collect();
        if !orphans.is_empty() {
            tracing::debug!("cascading delete of {} rows at level {level}", orphans.len());
        }
        for key in orphans {
            // Keys come from the tables themselves.
            let _ = self.delete(key);
        }
    }

    fn apply(&mut self, change: Change) -> Result<(), StoreError> {
        match change {
            Change::Put(row) => {
                self.put(row);
            }
            Change::Delete(key) => {
                self.delete(key)?;
                if let RowKey::Block(level) = key {
                    self.cascade(level);
                }
            }
        }
        Ok(())
    }

    fn last_activity(&self, subject: Subject, before: Level) -> Option<Level> {
        let below = |level: Level| level < before;
        match subject {
            Subject::Account(id) => {
                let ops = self
                    .all::<Operation>()
                    .filter(|op| below(op.level) && op.account_ids.contains(&id))
                    .map(|op| op.level);
                let blocks = self
                    .all::<crate::schema::Block>()
                    .filter(|b| below(b.level) && (b.proposer_id == id || b.producer_id == id))
                    .map(|b| b.level);
                ops.chain(blocks).max()
            }
            Subject::BigMap(id) => self
                .all::<BigMapUpdate>()
                .filter(|u| below(u.level) && u.big_map_id == id)
                .map(|u| u.level)
                .max(),
            Subject::BigMapKey(id) => self
                .all::<BigMapUpdate>()
                .filter(|u| below(u.level) && u.key_id == Some(id))
                .map(|u| u.level)
                .max(),
            Subject::Ticket(id) => self
                .all::<crate::schema::TicketTransfer>()
                .filter(|t| below(t.level) && t.ticket_id == id)
                .map(|t| t.level)
                .max(),
            Subject::TicketBalance(id) => {
                let balance = self
                    .get(RowKey::TicketBalance(id))
                    .and_then(crate::schema::TicketBalance::from_row_ref)?;
                let holder = Some(balance.account_id);
                self.all::<crate::schema::TicketTransfer>()
                    .filter(|t| below(t.level) && t.ticket_id == balance.ticket_id)
                    .filter(|t| t.from_id == holder || t.to_id == holder)
                    .map(|t| t.level)
                    .max()
            }
            Subject::Token(id) => self
                .all::<crate::schema::TokenTransfer>()
                .filter(|t| below(t.level) && t.token_id == id)
                .map(|t| t.level)
                .max(),
            Subject::TokenBalance(id) => {
                let balance = self
                    .get(RowKey::TokenBalance(id))
                    .and_then(crate::schema::TokenBalance::from_row_ref)?;
                let holder = Some(balance.account_id);
                self.all::<crate::schema::TokenTransfer>()
                    .filter(|t| below(t.level) && t.token_id == balance.token_id)
                    .filter(|t| t.from_id == holder || t.to_id == holder)
                    .map(|t| t.level)
                    .max()
            }
            Subject::UnstakeRequest(id) => self
                .all::<crate::schema::StakingUpdate>()
                .filter(|u| below(u.level) && u.request_id == Some(id))
                .map(|u| u.level)
                .max(),
        }
    }
}

/// Switches to make the store fail on purpose.
#[derive(Debug)]
struct Faults {
    /// Index of the change a commit fails at, `usize::MAX` when disabled
    commit_at: AtomicUsize,
    /// Number of upcoming commits to fail with a transient error
    transient_commits: AtomicUsize,
    /// Commits left before all further ones fail with a transient error,
    /// `usize::MAX` when disabled
    commit_budget: AtomicUsize,
    /// Make every read fail with a transient error
    reads: AtomicBool,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            commit_at: AtomicUsize::new(usize::MAX),
            transient_commits: AtomicUsize::new(0),
            commit_budget: AtomicUsize::new(usize::MAX),
            reads: AtomicBool::new(false),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<Arc<Tables>>,
    faults: Faults,
    commits: AtomicUsize,
}

/// Shared handle to an in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current committed version of the tables.
    pub fn snapshot(&self) -> Arc<Tables> {
        match self.inner.tables.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of successful commits so far.
    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Makes commits fail when reaching the change at `index`.
    pub fn fail_commit_at(&self, index: usize) {
        self.inner.faults.commit_at.store(index, Ordering::SeqCst);
    }

    /// Makes the next `n` commits fail with a transient error.
    pub fn fail_next_commits(&self, n: usize) {
        self.inner.faults.transient_commits.store(n, Ordering::SeqCst);
    }

    /// Lets `n` more commits through, then fails every commit with a
    /// transient error.
    pub fn fail_commits_after(&self, n: usize) {
        self.inner.faults.commit_budget.store(n, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.faults.reads.store(fail, Ordering::SeqCst);
    }

    /// Disables all injected faults.
    pub fn heal(&self) {
        self.fail_commit_at(usize::MAX);
        self.fail_next_commits(0);
        self.fail_commits_after(usize::MAX);
        self.fail_reads(false);
    }

    fn read(&self) -> Result<Arc<Tables>, StoreError> {
        if self.inner.faults.reads.load(Ordering::SeqCst) {
            return Err(StoreError::Fault {
                transient: true,
                detail: String::from("read failure"),
            });
        }
        Ok(self.snapshot())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn app_state(&self) -> Result<Option<AppState>, StoreError> {
        Ok(self.read()?.app_state.clone())
    }

    async fn get(&self, key: RowKey) -> Result<Option<Row>, StoreError> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn lookup(&self, key: &IndexKey) -> Result<Option<RowKey>, StoreError> {
        Ok(self.read()?.lookup(key))
    }

    async fn operations_at(&self, level: Level) -> Result<Vec<Operation>, StoreError> {
        Ok(self
            .read()?
            .all::<Operation>()
            .filter(|op| op.level == level)
            .cloned()
            .collect())
    }

    async fn rows_at(&self, table: Table, level: Level) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .read()?
            .rows(table)
            .filter(|r| r.level() == level)
            .cloned()
            .collect())
    }

    async fn previous_big_map_update(
        &self,
        key_id: RowId,
        before: RowId,
    ) -> Result<Option<BigMapUpdate>, StoreError> {
        Ok(self
            .read()?
            .all::<BigMapUpdate>()
            .filter(|u| u.key_id == Some(key_id) && u.id < before)
            .last()
            .cloned())
    }

    async fn last_activity(
        &self,
        subject: Subject,
        before: Level,
    ) -> Result<Option<Level>, StoreError> {
        Ok(self.read()?.last_activity(subject, before))
    }

    async fn delegates(&self) -> Result<Vec<AccountId>, StoreError> {
        Ok(self
            .read()?
            .all::<crate::schema::Account>()
            .filter(|a| a.profile.is_delegate())
            .map(|a| a.id)
            .collect())
    }

    async fn delegators(&self, baker: AccountId) -> Result<Vec<AccountId>, StoreError> {
        Ok(self
            .read()?
            .all::<crate::schema::Account>()
            .filter(|a| a.delegate_id == Some(baker) && a.id != baker)
            .map(|a| a.id)
            .collect())
    }

    async fn proposals(&self, epoch: i32) -> Result<Vec<Proposal>, StoreError> {
        Ok(self
            .read()?
            .all::<Proposal>()
            .filter(|p| p.epoch == epoch)
            .cloned()
            .collect())
    }

    async fn commit(&self, changeset: Changeset) -> Result<(), StoreError> {
        let faults = &self.inner.faults;
        let pending = faults.transient_commits.load(Ordering::SeqCst);
        if pending > 0 {
            faults.transient_commits.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Fault {
                transient: true,
                detail: format!("commit of level {} interrupted", changeset.level),
            });
        }
        let budget = faults.commit_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(StoreError::Fault {
                transient: true,
                detail: format!("commit of level {} refused", changeset.level),
            });
        }
        let fail_at = faults.commit_at.load(Ordering::SeqCst);

        let mut next: Tables = (*self.snapshot()).clone();
        for (i, change) in changeset.changes.into_iter().enumerate() {
            if i == fail_at {
                return Err(StoreError::Fault {
                    transient: false,
                    detail: format!("commit of level {} aborted at change {i}", changeset.level),
                });
            }
            next.apply(change)?;
        }
        next.app_state = Some(changeset.app_state);

        let mut guard = self
            .inner
            .tables
            .write()
            .map_err(|_| StoreError::Corrupt(String::from("poisoned table lock")))?;
        *guard = Arc::new(next);
        if budget != usize::MAX {
            faults.commit_budget.store(budget - 1, Ordering::SeqCst);
        }
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Account;
    use crate::schema::Block;
    use crate::schema::Profile;
    use pretty_assertions::assert_eq;

    fn block(level: Level) -> Block {
        Block {
            level,
            hash: format!("B{level}"),
            cycle: 0,
            timestamp: 0,
            proto_code: 1,
            payload_round: 0,
            proposer_id: 1,
            producer_id: 1,
            reward: 0,
            bonus: 0,
            fees: 0,
            operations_count: 0,
            validations: 0,
        }
    }

    fn changeset(level: Level, changes: Vec<Change>) -> Changeset {
        let mut app_state = AppState::initial();
        app_state.level = level;
        Changeset {
            level,
            changes,
            app_state,
        }
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let store = MemoryStore::new();
        let acc = Account::new(1, String::from("tz1a"), 0, Profile::Ghost);
        store
            .commit(changeset(
                0,
                vec![Change::Put(block(0).into()), Change::Put(acc.clone().into())],
            ))
            .await
            .unwrap();
        assert_eq!(store.app_state().await.unwrap().unwrap().level, 0);
        assert_eq!(
            store.get(RowKey::Account(1)).await.unwrap(),
            Some(Row::Account(acc))
        );
        assert_eq!(
            store
                .lookup(&IndexKey::AccountAddress(String::from("tz1a")))
                .await
                .unwrap(),
            Some(RowKey::Account(1))
        );
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_tables_untouched() {
        let store = MemoryStore::new();
        store
            .commit(changeset(0, vec![Change::Put(block(0).into())]))
            .await
            .unwrap();
        let before = store.snapshot();

        store.fail_commit_at(1);
        let res = store
            .commit(changeset(
                1,
                vec![Change::Put(block(1).into()), Change::Put(block(2).into())],
            ))
            .await;
        assert!(matches!(res, Err(StoreError::Fault { transient: false, .. })));
        assert_eq!(*store.snapshot(), *before);

        store.heal();
        store
            .commit(changeset(1, vec![Change::Put(block(1).into())]))
            .await
            .unwrap();
        assert_eq!(store.snapshot().count(Table::Block), 2);
    }

    #[tokio::test]
    async fn test_transient_commit_failures_are_counted() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        let err = store.commit(changeset(0, vec![])).await.unwrap_err();
        assert!(err.is_transient());
        store.commit(changeset(0, vec![])).await.unwrap();
    }

    #[tokio::test]
    async fn test_commits_fail_once_budget_is_spent() {
        let store = MemoryStore::new();
        store.fail_commits_after(1);
        store.commit(changeset(0, vec![])).await.unwrap();
        for _ in 0..3 {
            let err = store.commit(changeset(1, vec![])).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert_eq!(store.commits(), 1);
        store.heal();
        store.commit(changeset(1, vec![])).await.unwrap();
        assert_eq!(store.commits(), 2);
    }

    #[tokio::test]
    async fn test_deleting_missing_row_is_corruption() {
        let store = MemoryStore::new();
        let res = store
            .commit(changeset(0, vec![Change::Delete(RowKey::Account(9))]))
            .await;
        assert!(matches!(res, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_block_delete_cascades() {
        let store = MemoryStore::new();
        let stats = crate::schema::Statistics {
            id: 1,
            level: 4,
            cycle: 0,
            total_created: 0,
            total_burned: 0,
            total_activated: 0,
            total_frozen: 0,
            total_rollup_bonds: 0,
            total_supply: 0,
            circulating_supply: 0,
        };
        store
            .commit(changeset(
                4,
                vec![Change::Put(block(4).into()), Change::Put(stats.into())],
            ))
            .await
            .unwrap();
        store
            .commit(changeset(3, vec![Change::Delete(RowKey::Block(4))]))
            .await
            .unwrap();
        let tables = store.snapshot();
        assert_eq!(tables.count(Table::Statistics), 0);
        assert_eq!(tables.count(Table::Block), 0);
    }

    #[tokio::test]
    async fn test_index_follows_updates() {
        let store = MemoryStore::new();
        let mut acc = Account::new(1, String::from("tz1a"), 0, Profile::Ghost);
        store
            .commit(changeset(0, vec![Change::Put(acc.clone().into())]))
            .await
            .unwrap();
        acc.address = String::from("tz1b");
        store
            .commit(changeset(0, vec![Change::Put(acc.into())]))
            .await
            .unwrap();
        let tables = store.snapshot();
        assert_eq!(tables.lookup(&IndexKey::AccountAddress(String::from("tz1a"))), None);
        assert_eq!(
            tables.lookup(&IndexKey::AccountAddress(String::from("tz1b"))),
            Some(RowKey::Account(1))
        );
    }
}
