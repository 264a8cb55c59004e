use tokio_postgres::types::Json;

use super::param;
use super::Param;
use crate::schema::Account;
use crate::schema::OpsCounts;
use crate::schema::Profile;
use crate::store::StoreError;

pub(super) const COLUMNS: &[&str] = &[
    "id",
    "address",
    "kind",
    "first_level",
    "last_level",
    "balance",
    "staked_balance",
    "unstaked_balance",
    "rollup_bonds",
    "delegate_id",
    "delegated_balance",
    "delegators_count",
    "contracts_count",
    "smart_rollups_count",
    "tickets_count",
    "active_tickets_count",
    "ticket_balances_count",
    "ticket_transfers_count",
    "tokens_count",
    "active_tokens_count",
    "token_balances_count",
    "token_transfers_count",
    "staking_updates_count",
    "ops_counts",
    "profile",
];

pub(super) fn read(row: &tokio_postgres::Row) -> Result<Account, StoreError> {
    let ops_counts: Json<OpsCounts> = row.try_get("ops_counts")?;
    let profile: Json<Profile> = row.try_get("profile")?;
    Ok(Account {
        id: row.try_get("id")?,
        address: row.try_get("address")?,
        first_level: row.try_get("first_level")?,
        last_level: row.try_get("last_level")?,
        balance: row.try_get("balance")?,
        staked_balance: row.try_get("staked_balance")?,
        unstaked_balance: row.try_get("unstaked_balance")?,
        rollup_bonds: row.try_get("rollup_bonds")?,
        delegate_id: row.try_get("delegate_id")?,
        delegated_balance: row.try_get("delegated_balance")?,
        delegators_count: row.try_get("delegators_count")?,
        contracts_count: row.try_get("contracts_count")?,
        smart_rollups_count: row.try_get("smart_rollups_count")?,
        tickets_count: row.try_get("tickets_count")?,
        active_tickets_count: row.try_get("active_tickets_count")?,
        ticket_balances_count: row.try_get("ticket_balances_count")?,
        ticket_transfers_count: row.try_get("ticket_transfers_count")?,
        tokens_count: row.try_get("tokens_count")?,
        active_tokens_count: row.try_get("active_tokens_count")?,
        token_balances_count: row.try_get("token_balances_count")?,
        token_transfers_count: row.try_get("token_transfers_count")?,
        staking_updates_count: row.try_get("staking_updates_count")?,
        ops_counts: ops_counts.0,
        profile: profile.0,
    })
}

pub(super) fn params(a: &Account) -> Result<Vec<Param>, StoreError> {
    Ok(vec![
        param(a.id),
        param(a.address.clone()),
        param(a.kind()),
        param(a.first_level),
        param(a.last_level),
        param(a.balance),
        param(a.staked_balance),
        param(a.unstaked_balance),
        param(a.rollup_bonds),
        param(a.delegate_id),
        param(a.delegated_balance),
        param(a.delegators_count),
        param(a.contracts_count),
        param(a.smart_rollups_count),
        param(a.tickets_count),
        param(a.active_tickets_count),
        param(a.ticket_balances_count),
        param(a.ticket_transfers_count),
        param(a.tokens_count),
        param(a.active_tokens_count),
        param(a.token_balances_count),
        param(a.token_transfers_count),
        param(a.staking_updates_count),
        param(serde_json::to_value(&a.ops_counts)?),
        param(serde_json::to_value(&a.profile)?),
    ])
}
