use crate::core::types::Level;

/// Primary key of the singleton app state row.
pub const APP_STATE_ID: i32 = -1;

/// Default number of blocks the tracker keeps hashes of to locate a common ancestor.
pub const ROLLBACK_HORIZON: Level = 20;

/// Capacity of the address to account id cache.
pub const ACCOUNT_CACHE_SIZE: usize = 10_000;

/// Default port of the monitoring endpoint.
pub const MONITOR_PORT: u16 = 3005;
