//! Tezos chain indexer.
//!
//! Blocks are applied to a relational store one atomic commit per level and
//! rolled back the same way. Row ids come from counters that a rollback winds
//! back, so after a reorg the ids of removed rows are handed out again. See
//! [`ledger`].
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod ledger;
pub mod monitor;
pub mod schema;
pub mod store;
