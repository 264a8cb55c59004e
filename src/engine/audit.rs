//! Recomputes derived state from raw tables.
//!
//! Every counter, running total and balance kept by the engine can be
//! derived again from the rows it summarizes. `audit` does so on a store
//! snapshot and lists the values that disagree.
use num_bigint::BigInt;
use num_bigint::Sign;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::core::types::AccountId;
use crate::core::types::Level;
use crate::core::types::RowId;
use crate::schema::Account;
use crate::schema::AppState;
use crate::schema::BigMap;
use crate::schema::BigMapKey;
use crate::schema::BigMapUpdate;
use crate::schema::Block;
use crate::schema::Counter;
use crate::schema::Operation;
use crate::schema::OperationRecord;
use crate::schema::OpsCounts;
use crate::schema::RowKey;
use crate::schema::StakingUpdate;
use crate::schema::Table;
use crate::schema::Ticket;
use crate::schema::TicketBalance;
use crate::schema::TicketTransfer;
use crate::schema::Token;
use crate::schema::TokenBalance;
use crate::schema::TokenTransfer;
use crate::schema::UnstakeRequest;
use crate::store::memory::Tables;

/// A stored value that differs from the one derived from its sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub what: String,
    pub expected: String,
    pub found: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: expected {}, found {}", self.what, self.expected, self.found)
    }
}

#[derive(Default)]
struct Report(Vec<Violation>);

impl Report {
    fn check<T: PartialEq + Debug>(&mut self, what: impl Into<String>, expected: T, found: T) {
        if expected != found {
            self.0.push(Violation {
                what: what.into(),
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            });
        }
    }
}

/// Lists all derived values of `tables` that do not match their sources.
pub fn audit(tables: &Tables) -> Vec<Violation> {
    let mut report = Report::default();
    let initial = AppState::initial();
    let app = tables.app_state().unwrap_or(&initial);
    counters(tables, app, &mut report);
    levels(tables, app, &mut report);
    accounts(tables, &mut report);
    delegations(tables, &mut report);
    big_maps(tables, &mut report);
    tickets(tables, &mut report);
    tokens(tables, &mut report);
    staking(tables, &mut report);
    report.0
}

fn counters(tables: &Tables, app: &AppState, report: &mut Report) {
    for counter in Counter::ALL {
        let table = counter.table();
        let count = tables.count(table) as i64;
        report.check(format!("{} counter", counter.name()), count, app.counter(counter));
        if counter.allocates_ids() {
            let max_id = tables.rows(table).map(|r| r.key().id()).max().unwrap_or(0);
            report.check(format!("last id of {}", table.name()), max_id, count);
        }
    }
    let ops_counts: OpsCounts = tables
        .all::<Operation>()
        .map(|op| (op.kind(), 1))
        .collect();
    report.check("operation counts", &ops_counts, &app.ops_counts);
}

fn levels(tables: &Tables, app: &AppState, report: &mut Report) {
    let levels: Vec<Level> = tables.all::<Block>().map(|b| b.level).collect();
    if let (Some(first), Some(last)) = (levels.first(), levels.last()) {
        report.check("indexed levels", (last - first + 1) as usize, levels.len());
    }
    report.check("head level", levels.last().copied().unwrap_or(-1), app.level);
    for table in Table::ALL.iter().filter(|t| t.cascades()) {
        for row in tables.rows(*table) {
            if tables.get(RowKey::Block(row.level())).is_none() {
                report.check(format!("block of {}", row.key()), Some(row.level()), None);
            }
        }
    }
}

/// Operation counts and last activity levels.
fn accounts(tables: &Tables, report: &mut Report) {
    let mut counts: BTreeMap<AccountId, OpsCounts> = BTreeMap::new();
    let mut active: BTreeMap<AccountId, Level> = BTreeMap::new();
    for op in tables.all::<Operation>() {
        for id in &op.account_ids {
            counts.entry(*id).or_default().add(op.kind(), 1);
            let last = active.entry(*id).or_insert(op.level);
            *last = (*last).max(op.level);
        }
    }
    for block in tables.all::<Block>() {
        for id in [block.proposer_id, block.producer_id] {
            let last = active.entry(id).or_insert(block.level);
            *last = (*last).max(block.level);
        }
    }
    for account in tables.all::<Account>() {
        let expected = counts.remove(&account.id).unwrap_or_default();
        report.check(
            format!("operation counts of account {}", account.id),
            &expected,
            &account.ops_counts,
        );
        let last_level = active
            .get(&account.id)
            .map_or(account.first_level, |l| (*l).max(account.first_level));
        report.check(
            format!("last level of account {}", account.id),
            last_level,
            account.last_level,
        );
    }
    for id in counts.keys() {
        report.check("referenced account", Some(*id), None);
    }
}

fn delegations(tables: &Tables, report: &mut Report) {
    let mut delegated: BTreeMap<AccountId, (i64, i32)> = BTreeMap::new();
    for account in tables.all::<Account>() {
        if let Some(delegate) = account.delegate_id.filter(|d| *d != account.id) {
            let entry = delegated.entry(delegate).or_default();
            entry.0 += account.balance;
            entry.1 += 1;
        }
    }
    for account in tables.all::<Account>() {
        let expected = delegated.get(&account.id).copied().unwrap_or_default();
        report.check(
            format!("delegated balance and delegators of {}", account.id),
            expected,
            (account.delegated_balance, account.delegators_count),
        );
    }
}

fn big_maps(tables: &Tables, report: &mut Report) {
    let mut per_map: BTreeMap<RowId, i32> = BTreeMap::new();
    let mut per_key: BTreeMap<RowId, (i32, Option<&BigMapUpdate>)> = BTreeMap::new();
    for update in tables.all::<BigMapUpdate>() {
        *per_map.entry(update.big_map_id).or_default() += 1;
        if let Some(key_id) = update.key_id {
            let entry = per_key.entry(key_id).or_default();
            entry.0 += 1;
            entry.1 = Some(update);
        }
    }
    let mut keys: BTreeMap<RowId, (i32, i32)> = BTreeMap::new();
    for key in tables.all::<BigMapKey>() {
        let (updates, last) = per_key.get(&key.id).copied().unwrap_or_default();
        report.check(format!("updates of big map key {}", key.id), updates, key.updates_count);
        report.check(
            format!("value of big map key {}", key.id),
            last.and_then(|u| u.value.as_ref()),
            key.value.as_ref(),
        );
        report.check(
            format!("activity of big map key {}", key.id),
            key.value.is_some(),
            key.active,
        );
        let entry = keys.entry(key.big_map_id).or_default();
        entry.0 += 1;
        entry.1 += key.active as i32;
    }
    for big_map in tables.all::<BigMap>() {
        report.check(
            format!("updates of big map {}", big_map.id),
            per_map.get(&big_map.id).copied().unwrap_or(0),
            big_map.updates_count,
        );
        report.check(
            format!("keys of big map {}", big_map.id),
            keys.get(&big_map.id).copied().unwrap_or_default(),
            (big_map.total_keys, big_map.active_keys),
        );
    }
}

/// Totals of an asset obtained by replaying its transfers.
#[derive(Debug, Default, PartialEq)]
struct Replay {
    minted: BigInt,
    burned: BigInt,
    transfers: i32,
    /// Balance and transfers count per holder
    balances: BTreeMap<AccountId, (BigInt, i32)>,
}

impl Replay {
    fn transfer(&mut self, from: Option<AccountId>, to: Option<AccountId>, amount: &BigInt) {
        self.transfers += 1;
        match from {
            Some(id) => {
                let balance = self.balances.entry(id).or_default();
                balance.0 -= amount;
                balance.1 += 1;
            }
            None => self.minted += amount,
        }
        match to {
            Some(id) => {
                let balance = self.balances.entry(id).or_default();
                balance.0 += amount;
                balance.1 += 1;
            }
            None => self.burned += amount,
        }
    }

    fn holders(&self) -> i32 {
        self.balances
            .values()
            .filter(|(b, _)| b.sign() == Sign::Plus)
            .count() as i32
    }
}

/// Per-account ledger counts: issued, held, balances and transfers.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Holdings {
    issued: i32,
    active: i32,
    balances: i32,
    transfers: i32,
}

fn tickets(tables: &Tables, report: &mut Report) {
    let mut replays: BTreeMap<RowId, Replay> = BTreeMap::new();
    let mut holdings: BTreeMap<AccountId, Holdings> = BTreeMap::new();
    for t in tables.all::<TicketTransfer>() {
        replays
            .entry(t.ticket_id)
            .or_default()
            .transfer(t.from_id, t.to_id, &t.amount);
        for id in t.from_id.iter().chain(&t.to_id) {
            holdings.entry(*id).or_default().transfers += 1;
        }
    }
    for ticket in tables.all::<Ticket>() {
        let replay = replays.remove(&ticket.id).unwrap_or_default();
        let what = format!("ticket {}", ticket.id);
        holdings.entry(ticket.ticketer_id).or_default().issued += 1;
        report.check(
            format!("supply of {what}"),
            (&replay.minted, &replay.burned, &(&replay.minted - &replay.burned)),
            (&ticket.total_minted, &ticket.total_burned, &ticket.total_supply),
        );
        report.check(
            format!("counts of {what}"),
            (replay.transfers, replay.balances.len() as i32, replay.holders()),
            (ticket.transfers_count, ticket.balances_count, ticket.holders_count),
        );
        for (account_id, (balance, _)) in &replay.balances {
            let holding = holdings.entry(*account_id).or_default();
            holding.balances += 1;
            holding.active += (balance.sign() == Sign::Plus) as i32;
        }
        let mut rows = 0;
        for balance in tables.all::<TicketBalance>().filter(|b| b.ticket_id == ticket.id) {
            rows += 1;
            report.check(
                format!("balance of {} in {what}", balance.account_id),
                replay.balances.get(&balance.account_id).map(|(b, n)| (b, *n)),
                Some((&balance.balance, balance.transfers_count)),
            );
        }
        report.check(format!("balance rows of {what}"), replay.balances.len(), rows);
    }
    for account in tables.all::<Account>() {
        let expected = holdings.remove(&account.id).unwrap_or_default();
        report.check(
            format!("ticket holdings of account {}", account.id),
            expected,
            Holdings {
                issued: account.tickets_count,
                active: account.active_tickets_count,
                balances: account.ticket_balances_count,
                transfers: account.ticket_transfers_count,
            },
        );
    }
}

fn tokens(tables: &Tables, report: &mut Report) {
    let mut replays: BTreeMap<RowId, Replay> = BTreeMap::new();
    let mut holdings: BTreeMap<AccountId, Holdings> = BTreeMap::new();
    for t in tables.all::<TokenTransfer>() {
        replays
            .entry(t.token_id)
            .or_default()
            .transfer(t.from_id, t.to_id, &t.amount);
        for id in t.from_id.iter().chain(&t.to_id) {
            holdings.entry(*id).or_default().transfers += 1;
        }
    }
    for token in tables.all::<Token>() {
        let replay = replays.remove(&token.id).unwrap_or_default();
        let what = format!("token {}", token.id);
        holdings.entry(token.contract_id).or_default().issued += 1;
        report.check(
            format!("supply of {what}"),
            (&replay.minted, &replay.burned, &(&replay.minted - &replay.burned)),
            (&token.total_minted, &token.total_burned, &token.total_supply),
        );
        report.check(
            format!("counts of {what}"),
            (replay.transfers, replay.balances.len() as i32, replay.holders()),
            (token.transfers_count, token.balances_count, token.holders_count),
        );
        for (account_id, (balance, _)) in &replay.balances {
            let holding = holdings.entry(*account_id).or_default();
            holding.balances += 1;
            holding.active += (balance.sign() == Sign::Plus) as i32;
        }
        let mut rows = 0;
        for balance in tables.all::<TokenBalance>().filter(|b| b.token_id == token.id) {
            rows += 1;
            report.check(
                format!("balance of {} in {what}", balance.account_id),
                replay.balances.get(&balance.account_id).map(|(b, n)| (b, *n)),
                Some((&balance.balance, balance.transfers_count)),
            );
        }
        report.check(format!("balance rows of {what}"), replay.balances.len(), rows);
    }
    for account in tables.all::<Account>() {
        let expected = holdings.remove(&account.id).unwrap_or_default();
        report.check(
            format!("token holdings of account {}", account.id),
            expected,
            Holdings {
                issued: account.tokens_count,
                active: account.active_tokens_count,
                balances: account.token_balances_count,
                transfers: account.token_transfers_count,
            },
        );
    }
}

fn staking(tables: &Tables, report: &mut Report) {
    let mut per_staker: BTreeMap<AccountId, i32> = BTreeMap::new();
    let mut per_request: BTreeMap<RowId, i32> = BTreeMap::new();
    for update in tables.all::<StakingUpdate>() {
        *per_staker.entry(update.staker_id).or_default() += 1;
        if let Some(request_id) = update.request_id {
            *per_request.entry(request_id).or_default() += 1;
        }
    }
    for account in tables.all::<Account>() {
        report.check(
            format!("staking updates of account {}", account.id),
            per_staker.get(&account.id).copied().unwrap_or(0),
            account.staking_updates_count,
        );
    }
    for request in tables.all::<UnstakeRequest>() {
        report.check(
            format!("updates of unstake request {}", request.id),
            per_request.get(&request.id).copied().unwrap_or(0),
            request.updates_count,
        );
    }
    let frozen: i64 = tables
        .all::<Account>()
        .map(|a| a.staked_balance + a.unstaked_balance)
        .sum();
    if let Some(app) = tables.app_state() {
        report.check("frozen total", frozen, app.total_frozen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_tables_are_consistent() {
        assert_eq!(audit(&Tables::default()), vec![]);
    }

    #[test]
    fn test_replay_counts_holders() {
        let mut replay = Replay::default();
        replay.transfer(None, Some(1), &BigInt::from(10));
        replay.transfer(Some(1), Some(2), &BigInt::from(10));
        replay.transfer(Some(2), None, &BigInt::from(3));
        assert_eq!(replay.minted, BigInt::from(10));
        assert_eq!(replay.burned, BigInt::from(3));
        assert_eq!(replay.transfers, 3);
        assert_eq!(replay.holders(), 1);
        assert_eq!(replay.balances[&2], (BigInt::from(7), 2));
    }
}
