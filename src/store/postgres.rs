//! PostgreSQL backend.
//!
//! Each table has a submodule describing its columns, how to read a record
//! from a result row and how to bind one as statement parameters. Changesets
//! are applied in a single transaction with constraints deferred to commit.
mod accounts;
mod app_state;
mod big_maps;
mod blocks;
mod cycles;
mod operations;
mod schema;
mod staking;
mod tickets;
mod tokens;
mod voting;

use async_trait::async_trait;
use itertools::Itertools;
use num_bigint::BigInt;
use postgres_types::ToSql;
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tokio_postgres::NoTls;
use tokio_postgres::Transaction;

use super::Change;
use super::Changeset;
use super::Store;
use super::StoreError;
use crate::config::PostgresConfig;
use crate::core::types::AccountId;
use crate::core::types::Level;
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

/// Owned statement parameter.
type Param = Box<dyn ToSql + Sync + Send>;

fn param<T: ToSql + Sync + Send + 'static>(value: T) -> Param {
    Box::new(value)
}

/// Binds an unbounded amount, cast back to numeric in the statement.
fn numeric_param(value: &BigInt) -> Param {
    Box::new(value.to_string())
}

fn read_numeric(row: &tokio_postgres::Row, column: &str) -> Result<BigInt, StoreError> {
    let text: String = row.try_get(column)?;
    text.parse::<BigInt>()
        .map_err(|e| StoreError::Corrupt(format!("invalid numeric `{text}` in {column}: {e}")))
}

/// Layout of a table.
struct TableDef {
    name: &'static str,
    key: &'static str,
    level: &'static str,
    columns: &'static [&'static str],
    /// Columns of type numeric, exchanged as text
    numeric: &'static [&'static str],
}

impl TableDef {
    fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| {
                if self.numeric.contains(c) {
                    format!("{c}::text as {c}")
                } else {
                    c.to_string()
                }
            })
            .join(", ")
    }

    fn select_by_key(&self) -> String {
        format!(
            "select {} from tz.{} where {} = $1::bigint;",
            self.select_list(),
            self.name,
            self.key
        )
    }

    fn select_by_level(&self) -> String {
        format!(
            "select {} from tz.{} where {} = $1 order by {};",
            self.select_list(),
            self.name,
            self.level,
            self.key
        )
    }

    fn upsert(&self) -> String {
        let placeholders = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if self.numeric.contains(c) {
                    format!("${}::text::numeric", i + 1)
                } else {
                    format!("${}", i + 1)
                }
            })
            .join(", ");
        let updates = self
            .columns
            .iter()
            .filter(|c| **c != self.key)
            .map(|c| format!("{c} = excluded.{c}"))
            .join(", ");
        format!(
            "insert into tz.{} ({}) values ({}) on conflict ({}) do update set {};",
            self.name,
            self.columns.join(", "),
            placeholders,
            self.key,
            updates
        )
    }

    fn delete(&self) -> String {
        format!("delete from tz.{} where {} = $1::bigint;", self.name, self.key)
    }
}

const NONE: &[&str] = &[];
const BALANCE: &[&str] = &["balance"];
const AMOUNT: &[&str] = &["amount"];

fn def(table: Table) -> TableDef {
    let (name, key, level, columns, numeric): (
        &'static str,
        &'static str,
        &'static str,
        &'static [&'static str],
        &'static [&'static str],
    ) = match table {
        Table::Protocol => ("protocols", "code", "first_level", blocks::PROTOCOL_COLUMNS, NONE),
        Table::Block => ("blocks", "level", "level", blocks::BLOCK_COLUMNS, NONE),
        Table::Account => ("accounts", "id", "first_level", accounts::COLUMNS, NONE),
        Table::Operation => ("operations", "id", "level", operations::COLUMNS, NONE),
        Table::BigMap => ("big_maps", "id", "first_level", big_maps::BIG_MAP_COLUMNS, NONE),
        Table::BigMapKey => ("big_map_keys", "id", "first_level", big_maps::KEY_COLUMNS, NONE),
        Table::BigMapUpdate => ("big_map_updates", "id", "level", big_maps::UPDATE_COLUMNS, NONE),
        Table::Ticket => (
            "tickets",
            "id",
            "first_level",
            tickets::TICKET_COLUMNS,
            tickets::TICKET_NUMERIC,
        ),
        Table::TicketBalance => (
            "ticket_balances",
            "id",
            "first_level",
            tickets::BALANCE_COLUMNS,
            BALANCE,
        ),
        Table::TicketTransfer => (
            "ticket_transfers",
            "id",
            "level",
            tickets::TRANSFER_COLUMNS,
            AMOUNT,
        ),
        Table::Token => (
            "tokens",
            "id",
            "first_level",
            tokens::TOKEN_COLUMNS,
            tokens::TOKEN_NUMERIC,
        ),
        Table::TokenBalance => (
            "token_balances",
            "id",
            "first_level",
            tokens::BALANCE_COLUMNS,
            BALANCE,
        ),
        Table::TokenTransfer => (
            "token_transfers",
            "id",
            "level",
            tokens::TRANSFER_COLUMNS,
            AMOUNT,
        ),
        Table::Cycle => ("cycles", "index", "level", cycles::CYCLE_COLUMNS, NONE),
        Table::BakerCycle => ("baker_cycles", "id", "level", cycles::BAKER_COLUMNS, NONE),
        Table::DelegatorCycle => (
            "delegator_cycles",
            "id",
            "level",
            cycles::DELEGATOR_COLUMNS,
            NONE,
        ),
        Table::SnapshotBalance => (
            "snapshot_balances",
            "id",
            "level",
            cycles::SNAPSHOT_COLUMNS,
            NONE,
        ),
        Table::Statistics => ("statistics", "id", "level", cycles::STATISTICS_COLUMNS, NONE),
        Table::VotingPeriod => ("voting_periods", "index", "level", voting::PERIOD_COLUMNS, NONE),
        Table::VotingSnapshot => (
            "voting_snapshots",
            "id",
            "level",
            voting::SNAPSHOT_COLUMNS,
            NONE,
        ),
        Table::Proposal => ("proposals", "id", "first_level", voting::PROPOSAL_COLUMNS, NONE),
        Table::StakingUpdate => ("staking_updates", "id", "level", staking::UPDATE_COLUMNS, NONE),
        Table::UnstakeRequest => (
            "unstake_requests",
            "id",
            "first_level",
            staking::REQUEST_COLUMNS,
            NONE,
        ),
    };
    TableDef {
        name,
        key,
        level,
        columns,
        numeric,
    }
}

fn read(table: Table, row: &tokio_postgres::Row) -> Result<Row, StoreError> {
    Ok(match table {
        Table::Protocol => blocks::read_protocol(row)?.into(),
        Table::Block => blocks::read_block(row)?.into(),
        Table::Account => accounts::read(row)?.into(),
        Table::Operation => operations::read(row)?.into(),
        Table::BigMap => big_maps::read_big_map(row)?.into(),
        Table::BigMapKey => big_maps::read_key(row)?.into(),
        Table::BigMapUpdate => big_maps::read_update(row)?.into(),
        Table::Ticket => tickets::read_ticket(row)?.into(),
        Table::TicketBalance => tickets::read_balance(row)?.into(),
        Table::TicketTransfer => tickets::read_transfer(row)?.into(),
        Table::Token => tokens::read_token(row)?.into(),
        Table::TokenBalance => tokens::read_balance(row)?.into(),
        Table::TokenTransfer => tokens::read_transfer(row)?.into(),
        Table::Cycle => cycles::read_cycle(row)?.into(),
        Table::BakerCycle => cycles::read_baker_cycle(row)?.into(),
        Table::DelegatorCycle => cycles::read_delegator_cycle(row)?.into(),
        Table::SnapshotBalance => cycles::read_snapshot(row)?.into(),
        Table::Statistics => cycles::read_statistics(row)?.into(),
        Table::VotingPeriod => voting::read_period(row)?.into(),
        Table::VotingSnapshot => voting::read_snapshot(row)?.into(),
        Table::Proposal => voting::read_proposal(row)?.into(),
        Table::StakingUpdate => staking::read_update(row)?.into(),
        Table::UnstakeRequest => staking::read_request(row)?.into(),
    })
}

fn params(row: &Row) -> Result<Vec<Param>, StoreError> {
    Ok(match row {
        Row::Protocol(r) => blocks::protocol_params(r),
        Row::Block(r) => blocks::block_params(r),
        Row::Account(r) => accounts::params(r)?,
        Row::Operation(r) => operations::params(r)?,
        Row::BigMap(r) => big_maps::big_map_params(r),
        Row::BigMapKey(r) => big_maps::key_params(r),
        Row::BigMapUpdate(r) => big_maps::update_params(r),
        Row::Ticket(r) => tickets::ticket_params(r),
        Row::TicketBalance(r) => tickets::balance_params(r),
        Row::TicketTransfer(r) => tickets::transfer_params(r),
        Row::Token(r) => tokens::token_params(r),
        Row::TokenBalance(r) => tokens::balance_params(r),
        Row::TokenTransfer(r) => tokens::transfer_params(r),
        Row::Cycle(r) => cycles::cycle_params(r),
        Row::BakerCycle(r) => cycles::baker_cycle_params(r),
        Row::DelegatorCycle(r) => cycles::delegator_cycle_params(r),
        Row::SnapshotBalance(r) => cycles::snapshot_params(r),
        Row::Statistics(r) => cycles::statistics_params(r),
        Row::VotingPeriod(r) => voting::period_params(r),
        Row::VotingSnapshot(r) => voting::snapshot_params(r),
        Row::Proposal(r) => voting::proposal_params(r),
        Row::StakingUpdate(r) => staking::update_params(r),
        Row::UnstakeRequest(r) => staking::request_params(r),
    })
}

fn refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

async fn put(pgtx: &Transaction<'_>, row: &Row) -> Result<(), StoreError> {
    let values = params(row)?;
    let stmt = match row {
        Row::Operation(op) => operations::upsert_stmt(op),
        _ => def(row.table()).upsert(),
    };
    pgtx.execute(&stmt, &refs(&values)).await?;
    Ok(())
}

async fn delete(pgtx: &Transaction<'_>, key: RowKey) -> Result<(), StoreError> {
    let deleted = match key {
        RowKey::Operation(id) => operations::delete(pgtx, id).await?,
        _ => pgtx.execute(&def(key.table()).delete(), &[&key.id()]).await?,
    };
    if deleted == 0 {
        return Err(StoreError::Corrupt(format!("deleting missing row {key}")));
    }
    Ok(())
}

/// Store backed by a PostgreSQL database.
#[derive(Debug)]
pub struct PgStore {
    client: Mutex<Client>,
}

impl PgStore {
    /// Connects and makes sure the schema is in place.
    pub async fn new(pgconf: &PostgresConfig) -> Result<Self, StoreError> {
        tracing::debug!("initializing new store");
        let (mut client, connection) =
            tokio_postgres::connect(&pgconf.connection_uri, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("connection error: {}", e);
            }
        });

        schema::init(&mut client).await?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn app_state(&self) -> Result<Option<AppState>, StoreError> {
        let client = self.client.lock().await;
        app_state::get(&client).await
    }

    async fn get(&self, key: RowKey) -> Result<Option<Row>, StoreError> {
        let table = key.table();
        let client = self.client.lock().await;
        match client.query_opt(&def(table).select_by_key(), &[&key.id()]).await? {
            Some(row) => Ok(Some(read(table, &row)?)),
            None => Ok(None),
        }
    }

    async fn lookup(&self, key: &IndexKey) -> Result<Option<RowKey>, StoreError> {
        let client = self.client.lock().await;
        let row = match key {
            IndexKey::AccountAddress(address) => {
                let qry = "select id from tz.accounts where address = $1;";
                client.query_opt(qry, &[address]).await?
            }
            IndexKey::ProtocolHash(hash) => {
                let qry = "select code::bigint from tz.protocols where hash = $1;";
                client.query_opt(qry, &[hash]).await?
            }
            IndexKey::BigMapPtr(ptr) => {
                let qry = "select id from tz.big_maps where ptr = $1;";
                client.query_opt(qry, &[ptr]).await?
            }
            IndexKey::BigMapKey {
                big_map_id,
                key_hash,
            } => {
                let qry = "select id from tz.big_map_keys where big_map_id = $1 and key_hash = $2;";
                client.query_opt(qry, &[big_map_id, key_hash]).await?
            }
            IndexKey::Ticket {
                ticketer_id,
                content_hash,
            } => {
                let qry = "select id from tz.tickets where ticketer_id = $1 and content_hash = $2;";
                client.query_opt(qry, &[ticketer_id, content_hash]).await?
            }
            IndexKey::TicketBalance {
                ticket_id,
                account_id,
            } => {
                let qry =
                    "select id from tz.ticket_balances where ticket_id = $1 and account_id = $2;";
                client.query_opt(qry, &[ticket_id, account_id]).await?
            }
            IndexKey::Token {
                contract_id,
                token_id,
            } => {
                let qry = "select id from tz.tokens where contract_id = $1 and token_id = $2;";
                client.query_opt(qry, &[contract_id, token_id]).await?
            }
            IndexKey::TokenBalance {
                token_id,
                account_id,
            } => {
                let qry =
                    "select id from tz.token_balances where token_id = $1 and account_id = $2;";
                client.query_opt(qry, &[token_id, account_id]).await?
            }
            IndexKey::BakerCycle { cycle, baker_id } => {
                let qry = "select id from tz.baker_cycles where cycle = $1 and baker_id = $2;";
                client.query_opt(qry, &[cycle, baker_id]).await?
            }
            IndexKey::VotingSnapshot { period, baker_id } => {
                let qry = "select id from tz.voting_snapshots where period = $1 and baker_id = $2;";
                client.query_opt(qry, &[period, baker_id]).await?
            }
            IndexKey::Proposal { epoch, hash } => {
                let qry = "select id from tz.proposals where epoch = $1 and hash = $2;";
                client.query_opt(qry, &[epoch, hash]).await?
            }
            IndexKey::UnstakeRequest {
                cycle,
                baker_id,
                staker_id,
            } => {
                let qry = "
                    select id
                    from tz.unstake_requests
                    where cycle = $1 and baker_id = $2 and staker_id = $3;";
                client.query_opt(qry, &[cycle, baker_id, staker_id]).await?
            }
        };
        let id: Option<i64> = match row {
            Some(row) => Some(row.try_get(0)?),
            None => None,
        };
        Ok(id.map(|id| match key {
            IndexKey::AccountAddress(_) => RowKey::Account(id),
            IndexKey::ProtocolHash(_) => RowKey::Protocol(id as i32),
            IndexKey::BigMapPtr(_) => RowKey::BigMap(id),
            IndexKey::BigMapKey { .. } => RowKey::BigMapKey(id),
            IndexKey::Ticket { .. } => RowKey::Ticket(id),
            IndexKey::TicketBalance { .. } => RowKey::TicketBalance(id),
            IndexKey::Token { .. } => RowKey::Token(id),
            IndexKey::TokenBalance { .. } => RowKey::TokenBalance(id),
            IndexKey::BakerCycle { .. } => RowKey::BakerCycle(id),
            IndexKey::VotingSnapshot { .. } => RowKey::VotingSnapshot(id),
            IndexKey::Proposal { .. } => RowKey::Proposal(id),
            IndexKey::UnstakeRequest { .. } => RowKey::UnstakeRequest(id),
        }))
    }

    async fn operations_at(&self, level: Level) -> Result<Vec<Operation>, StoreError> {
        let client = self.client.lock().await;
        let rows = client
            .query(&def(Table::Operation).select_by_level(), &[&level])
            .await?;
        rows.iter().map(operations::read).collect()
    }

    async fn rows_at(&self, table: Table, level: Level) -> Result<Vec<Row>, StoreError> {
        let client = self.client.lock().await;
        let rows = client.query(&def(table).select_by_level(), &[&level]).await?;
        rows.iter().map(|r| read(table, r)).collect()
    }

    async fn previous_big_map_update(
        &self,
        key_id: RowId,
        before: RowId,
    ) -> Result<Option<BigMapUpdate>, StoreError> {
        let client = self.client.lock().await;
        big_maps::previous_update(&client, key_id, before).await
    }

    async fn last_activity(
        &self,
        subject: Subject,
        before: Level,
    ) -> Result<Option<Level>, StoreError> {
        let qry = match subject {
            Subject::Account(_) => {
                "
                select greatest(
                    (select max(level) from tz.operations where account_ids @> array[$1::bigint] and level < $2),
                    (select max(level) from tz.blocks where (proposer_id = $1 or producer_id = $1) and level < $2)
                );"
            }
            Subject::BigMap(_) => {
                "select max(level) from tz.big_map_updates where big_map_id = $1 and level < $2;"
            }
            Subject::BigMapKey(_) => {
                "select max(level) from tz.big_map_updates where key_id = $1 and level < $2;"
            }
            Subject::Ticket(_) => {
                "select max(level) from tz.ticket_transfers where ticket_id = $1 and level < $2;"
            }
            Subject::TicketBalance(_) => {
                "
                select max(t.level)
                from tz.ticket_balances b
                join tz.ticket_transfers t on t.ticket_id = b.ticket_id
                    and (t.from_id = b.account_id or t.to_id = b.account_id)
                where b.id = $1 and t.level < $2;"
            }
            Subject::Token(_) => {
                "select max(level) from tz.token_transfers where token_id = $1 and level < $2;"
            }
            Subject::TokenBalance(_) => {
                "
                select max(t.level)
                from tz.token_balances b
                join tz.token_transfers t on t.token_id = b.token_id
                    and (t.from_id = b.account_id or t.to_id = b.account_id)
                where b.id = $1 and t.level < $2;"
            }
            Subject::UnstakeRequest(_) => {
                "select max(level) from tz.staking_updates where request_id = $1 and level < $2;"
            }
        };
        let id = subject.row_key().id();
        let client = self.client.lock().await;
        Ok(client.query_one(qry, &[&id, &before]).await?.try_get(0)?)
    }

    async fn delegates(&self) -> Result<Vec<AccountId>, StoreError> {
        let client = self.client.lock().await;
        let qry = "select id from tz.accounts where kind = 'delegate' order by id;";
        let rows = client.query(qry, &[]).await?;
        Ok(rows.iter().map(|r| r.try_get(0)).collect::<Result<_, _>>()?)
    }

    async fn delegators(&self, baker: AccountId) -> Result<Vec<AccountId>, StoreError> {
        let client = self.client.lock().await;
        let qry = "select id from tz.accounts where delegate_id = $1 and id <> $1 order by id;";
        let rows = client.query(qry, &[&baker]).await?;
        Ok(rows.iter().map(|r| r.try_get(0)).collect::<Result<_, _>>()?)
    }

    async fn proposals(&self, epoch: i32) -> Result<Vec<Proposal>, StoreError> {
        let table = def(Table::Proposal);
        let qry = format!(
            "select {} from tz.proposals where epoch = $1 order by id;",
            table.select_list()
        );
        let client = self.client.lock().await;
        let rows = client.query(&qry, &[&epoch]).await?;
        rows.iter().map(voting::read_proposal).collect()
    }

    async fn commit(&self, changeset: Changeset) -> Result<(), StoreError> {
        tracing::trace!(
            "committing {} changes for level {}",
            changeset.changes.len(),
            changeset.level
        );
        let mut client = self.client.lock().await;
        let pgtx = client.transaction().await?;
        pgtx.batch_execute("set constraints all deferred;").await?;
        for change in &changeset.changes {
            match change {
                Change::Put(row) => put(&pgtx, row).await?,
                Change::Delete(key) => delete(&pgtx, *key).await?,
            }
        }
        app_state::upsert(&pgtx, &changeset.app_state).await?;
        pgtx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_upsert_statement() {
        let stmt = def(Table::TicketBalance).upsert();
        assert!(stmt.starts_with("insert into tz.ticket_balances (id, ticket_id"));
        assert!(stmt.contains("$5::text::numeric"));
        assert!(stmt.ends_with("transfers_count = excluded.transfers_count;"));
        assert!(!stmt.contains("set id = "));
        assert!(!stmt.contains(", id = "));
    }

    #[test]
    fn test_select_casts_numeric_columns() {
        let list = def(Table::Ticket).select_list();
        assert!(list.contains("total_supply::text as total_supply"));
        assert!(list.starts_with("id, ticketer_id"));
    }

    #[test]
    fn test_every_table_has_its_key_and_level_columns() {
        for table in Table::ALL {
            let d = def(*table);
            assert_eq!(d.name, table.name());
            assert!(d.columns.contains(&d.key), "{}", d.name);
            assert!(d.columns.contains(&d.level), "{}", d.name);
        }
    }
}
