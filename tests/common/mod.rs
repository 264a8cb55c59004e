#![allow(dead_code)] // not used by all tests
pub mod chain;
pub mod mock_chain;
pub mod node_mockup;
pub mod ops;

use tzindex::core::types::ChainConstants;
use tzindex::engine::audit::audit;
use tzindex::schema::Account;
use tzindex::schema::Entity;
use tzindex::schema::IndexKey;
use tzindex::store::memory::Tables;
use tzindex::store::MemoryStore;

pub fn set_tracing_subscriber(set: bool) -> Option<tracing::dispatcher::DefaultGuard> {
    if !set {
        return None;
    }
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    Some(tracing::subscriber::set_default(subscriber))
}

/// Short cycles and voting periods, so boundaries show up in small chains.
pub fn constants() -> ChainConstants {
    ChainConstants {
        blocks_per_cycle: 8,
        cycles_per_voting_period: 2,
        min_baker_stake: 1000,
        ..ChainConstants::default()
    }
}

/// Account with given `address`, panicking if unknown.
pub fn account(tables: &Tables, address: &str) -> Account {
    let key = tables
        .lookup(&IndexKey::AccountAddress(address.to_owned()))
        .unwrap_or_else(|| panic!("no account {address}"));
    tables
        .get(key)
        .and_then(Account::from_row_ref)
        .cloned()
        .unwrap()
}

pub fn has_account(tables: &Tables, address: &str) -> bool {
    tables
        .lookup(&IndexKey::AccountAddress(address.to_owned()))
        .is_some()
}

/// Checks every derived value of the store against its sources.
pub fn assert_consistent(store: &MemoryStore) {
    let violations = audit(&store.snapshot());
    assert!(violations.is_empty(), "{violations:#?}");
}
