//! Working set of a single block mutation.
//!
//! Reads go through the unit so that rows written earlier in the same
//! mutation are seen in their latest version. Nothing reaches the store
//! until the unit is turned into a `Changeset`.
use lru::LruCache;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

use super::error::Inconsistency;
use super::error::MutationError;
use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::Level;
use crate::ledger;
use crate::schema::AppState;
use crate::schema::Counter;
use crate::schema::Entity;
use crate::schema::IndexKey;
use crate::schema::Row;
use crate::schema::RowKey;
use crate::schema::Subject;
use crate::store::Change;
use crate::store::Changeset;
use crate::store::Store;

pub(crate) struct Unit<'a, S: Store> {
    store: &'a S,
    cache: &'a LruCache<Address, AccountId>,
    /// Level being applied or rolled back
    pub level: Level,
    pub app: AppState,
    /// Rows read or written so far, none for absent ones
    rows: HashMap<RowKey, Option<Row>>,
    /// Keys found in the store
    stored: HashSet<RowKey>,
    /// Keys written to, in order of first write
    written: Vec<RowKey>,
    index: HashMap<IndexKey, Option<RowKey>>,
    created_accounts: Vec<(Address, AccountId)>,
    touched: BTreeSet<Subject>,
}

impl<'a, S: Store> Unit<'a, S> {
    pub fn new(
        store: &'a S,
        cache: &'a LruCache<Address, AccountId>,
        app: AppState,
        level: Level,
    ) -> Self {
        Self {
            store,
            cache,
            level,
            app,
            rows: HashMap::new(),
            stored: HashSet::new(),
            written: vec![],
            index: HashMap::new(),
            created_accounts: vec![],
            touched: BTreeSet::new(),
        }
    }

    pub fn store(&self) -> &S {
        self.store
    }

    /// Wraps an inconsistency with the current level.
    pub fn fail(&self, kind: Inconsistency) -> MutationError {
        MutationError::Consistency {
            level: self.level,
            kind,
        }
    }

    pub fn check<T>(&self, res: Result<T, Inconsistency>) -> Result<T, MutationError> {
        res.map_err(|kind| self.fail(kind))
    }

    async fn load(&mut self, key: RowKey) -> Result<Option<&Row>, MutationError> {
        if !self.rows.contains_key(&key) {
            let row = self.store.get(key).await?;
            if row.is_some() {
                self.stored.insert(key);
            }
            self.rows.insert(key, row);
        }
        Ok(self.rows.get(&key).and_then(|r| r.as_ref()))
    }

    pub async fn get<E: Entity>(&mut self, key: RowKey) -> Result<Option<E>, MutationError> {
        Ok(self.load(key).await?.and_then(E::from_row_ref).cloned())
    }

    pub async fn require<E: Entity>(&mut self, key: RowKey) -> Result<E, MutationError> {
        match self.get(key).await? {
            Some(e) => Ok(e),
            None => Err(self.fail(Inconsistency::MissingRow(key))),
        }
    }

    pub async fn lookup(&mut self, key: &IndexKey) -> Result<Option<RowKey>, MutationError> {
        if let Some(found) = self.index.get(key) {
            return Ok(*found);
        }
        if let IndexKey::AccountAddress(address) = key {
            if let Some(id) = self.cache.peek(address) {
                return Ok(Some(RowKey::Account(*id)));
            }
        }
        let found = self.store.lookup(key).await?;
        self.index.insert(key.clone(), found);
        Ok(found)
    }

    /// Row matching a unique secondary key.
    pub async fn find<E: Entity>(&mut self, key: &IndexKey) -> Result<Option<E>, MutationError> {
        match self.lookup(key).await? {
            Some(row_key) => self.get(row_key).await,
            None => Ok(None),
        }
    }

    /// Inserts or replaces a row.
    ///
    /// Existing rows must have been read through the unit first.
    pub fn put<E: Entity>(&mut self, entity: E) {
        let key = entity.key();
        let row: Row = entity.into();
        let new_keys = row.index_keys();
        if let Some(Some(old)) = self.rows.get(&key) {
            for index_key in old.index_keys() {
                if !new_keys.contains(&index_key) {
                    self.index.insert(index_key, None);
                }
            }
        }
        for index_key in new_keys {
            self.index.insert(index_key, Some(key));
        }
        self.mark_written(key);
        self.rows.insert(key, Some(row));
    }

    pub async fn delete(&mut self, key: RowKey) -> Result<(), MutationError> {
        let index_keys = self.load(key).await?.map(|row| row.index_keys());
        let Some(index_keys) = index_keys else {
            return Err(self.fail(Inconsistency::MissingRow(key)));
        };
        for index_key in index_keys {
            self.index.insert(index_key, None);
        }
        self.mark_written(key);
        self.rows.insert(key, None);
        Ok(())
    }

    /// Deletes a row and gives its id back to `counter`.
    pub async fn drop_row(&mut self, key: RowKey, counter: Counter) -> Result<(), MutationError> {
        self.delete(key).await?;
        self.release(counter, key.id())
    }

    fn mark_written(&mut self, key: RowKey) {
        if !self.written.contains(&key) {
            self.written.push(key);
        }
    }

    /// Rows of a table attached to the current level, latest versions.
    pub async fn rows_at<E: Entity>(&mut self) -> Result<Vec<E>, MutationError> {
        let committed = self.store.rows_at(E::TABLE, self.level).await?;
        let mut rows = vec![];
        for row in committed {
            let key = row.key();
            let current = match self.rows.get(&key) {
                Some(cached) => cached.clone(),
                None => Some(row),
            };
            rows.extend(current.and_then(E::from_row));
        }
        Ok(rows)
    }

    pub fn allocate(&mut self, counter: Counter) -> i64 {
        ledger::allocate(&mut self.app, counter)
    }

    pub fn release(&mut self, counter: Counter, id: i64) -> Result<(), MutationError> {
        let res = ledger::release(&mut self.app, counter, id);
        self.check(res)
    }

    pub fn account_created(&mut self, address: Address, id: AccountId) {
        self.created_accounts.push((address, id));
    }

    /// Marks a row whose last level must be derived again once rolled back.
    pub fn touch(&mut self, subject: Subject) {
        self.touched.insert(subject);
    }

    /// Sets the last level of touched rows to their latest activity before the current level.
    pub async fn restore_last_levels(&mut self) -> Result<(), MutationError> {
        let subjects = std::mem::take(&mut self.touched);
        for subject in subjects {
            let key = subject.row_key();
            let mut row = match self.load(key).await? {
                Some(row) => row.clone(),
                None => continue,
            };
            let first_level = row.level();
            let last_level = self
                .store
                .last_activity(subject, self.level)
                .await?
                .map_or(first_level, |l| l.max(first_level));
            if set_last_level(&mut row, last_level) {
                let index_keys = row.index_keys();
                for index_key in index_keys {
                    self.index.insert(index_key, Some(key));
                }
                self.mark_written(key);
                self.rows.insert(key, Some(row));
            }
        }
        Ok(())
    }

    /// Collects all writes, deletions first and the block row last among them.
    pub fn finish(self) -> (Changeset, Vec<(Address, AccountId)>) {
        let mut deletes = vec![];
        let mut block_deletes = vec![];
        let mut puts = vec![];
        for key in &self.written {
            match self.rows.get(key) {
                Some(Some(row)) => puts.push(Change::Put(row.clone())),
                _ if !self.stored.contains(key) => (),
                _ if matches!(key, RowKey::Block(_)) => block_deletes.push(Change::Delete(*key)),
                _ => deletes.push(Change::Delete(*key)),
            }
        }
        let mut changes = deletes;
        changes.extend(block_deletes);
        changes.extend(puts);
        let changeset = Changeset {
            level: self.level,
            changes,
            app_state: self.app,
        };
        (changeset, self.created_accounts)
    }
}

/// Returns true if the row had a different last level.
fn set_last_level(row: &mut Row, level: Level) -> bool {
    let field = match row {
        Row::Account(r) => &mut r.last_level,
        Row::BigMap(r) => &mut r.last_level,
        Row::BigMapKey(r) => &mut r.last_level,
        Row::Ticket(r) => &mut r.last_level,
        Row::TicketBalance(r) => &mut r.last_level,
        Row::Token(r) => &mut r.last_level,
        Row::TokenBalance(r) => &mut r.last_level,
        Row::UnstakeRequest(r) => &mut r.last_level,
        _ => return false,
    };
    let changed = *field != level;
    *field = level;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Account;
    use crate::schema::Profile;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn account(id: AccountId, address: &str) -> Account {
        Account::new(id, String::from(address), 1, Profile::Ghost)
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut app = AppState::initial();
        app.account_counter = 1;
        store
            .commit(Changeset {
                level: 1,
                changes: vec![Change::Put(account(1, "tz1a").into())],
                app_state: app,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_reads_see_own_writes() {
        let store = seeded().await;
        let cache = LruCache::unbounded();
        let mut unit = Unit::new(&store, &cache, AppState::initial(), 2);

        let mut acc: Account = unit.require(RowKey::Account(1)).await.unwrap();
        acc.balance = 10;
        unit.put(acc);
        let acc: Account = unit.require(RowKey::Account(1)).await.unwrap();
        assert_eq!(acc.balance, 10);

        // Store is untouched until commit
        let stored = store.get(RowKey::Account(1)).await.unwrap().unwrap();
        assert_eq!(Account::from_row(stored).unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_lookup_follows_deletes() {
        let store = seeded().await;
        let cache = LruCache::unbounded();
        let mut unit = Unit::new(&store, &cache, AppState::initial(), 2);
        let key = IndexKey::AccountAddress(String::from("tz1a"));

        assert_eq!(unit.lookup(&key).await.unwrap(), Some(RowKey::Account(1)));
        unit.delete(RowKey::Account(1)).await.unwrap();
        assert_eq!(unit.lookup(&key).await.unwrap(), None);
        assert!(unit.delete(RowKey::Account(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_finish_skips_rows_created_and_deleted() {
        let store = seeded().await;
        let cache = LruCache::unbounded();
        let mut unit = Unit::new(&store, &cache, AppState::initial(), 2);

        unit.put(account(2, "tz1b"));
        unit.delete(RowKey::Account(2)).await.unwrap();
        unit.delete(RowKey::Account(1)).await.unwrap();
        let (changeset, _) = unit.finish();
        assert_eq!(changeset.changes, vec![Change::Delete(RowKey::Account(1))]);
    }

    #[tokio::test]
    async fn test_cached_addresses_resolve_without_store() {
        let store = MemoryStore::new();
        let mut cache = LruCache::unbounded();
        cache.put(String::from("tz1c"), 7);
        let mut unit = Unit::new(&store, &cache, AppState::initial(), 2);
        let key = IndexKey::AccountAddress(String::from("tz1c"));
        assert_eq!(unit.lookup(&key).await.unwrap(), Some(RowKey::Account(7)));
    }
}
