//! One table per operation kind, sharing the envelope columns.
//!
//! The `tz.operations` view unions all of them for reads by id or level.
use itertools::Itertools;
use tokio_postgres::types::Json;
use tokio_postgres::Transaction;

use super::param;
use super::Param;
use crate::core::types::OperationId;
use crate::schema::operations::Fees;
use crate::schema::operations::Usage;
use crate::schema::Content;
use crate::schema::Envelope;
use crate::schema::Operation;
use crate::schema::OperationKind;
use crate::schema::OperationRecord;
use crate::store::StoreError;

pub(super) const COLUMNS: &[&str] = &[
    "id",
    "level",
    "timestamp",
    "hash",
    "sender_id",
    "initiator_id",
    "nonce",
    "counter",
    "baker_fee",
    "storage_fee",
    "allocation_fee",
    "gas_limit",
    "gas_used",
    "storage_limit",
    "storage_used",
    "status",
    "errors",
    "account_ids",
    "content",
];

/// Log columns pointing to the operation that caused a row.
const CAUSES: &[(&str, OperationKind)] = &[
    ("big_map_updates", OperationKind::Origination),
    ("big_map_updates", OperationKind::Transaction),
    ("big_map_updates", OperationKind::Migration),
    ("ticket_transfers", OperationKind::Transaction),
    ("ticket_transfers", OperationKind::TransferTicket),
    ("ticket_transfers", OperationKind::SmartRollupExecute),
    ("ticket_transfers", OperationKind::Migration),
    ("token_transfers", OperationKind::Origination),
    ("token_transfers", OperationKind::Transaction),
    ("token_transfers", OperationKind::Migration),
    ("staking_updates", OperationKind::Staking),
    ("staking_updates", OperationKind::Autostaking),
    ("staking_updates", OperationKind::DoubleBaking),
    ("staking_updates", OperationKind::DoubleEndorsing),
    ("staking_updates", OperationKind::DoublePreendorsing),
];

fn table_ddl(kind: OperationKind) -> String {
    let t = kind.table_name();
    format!(
        "
        create table tz.{t} (
            id bigint primary key,
            level integer not null references tz.blocks(level) on delete cascade deferrable initially deferred,
            timestamp bigint not null,
            hash text,
            sender_id bigint not null references tz.accounts(id) deferrable initially deferred,
            initiator_id bigint references tz.accounts(id) deferrable initially deferred,
            nonce integer,
            counter bigint,
            baker_fee bigint not null,
            storage_fee bigint not null,
            allocation_fee bigint not null,
            gas_limit bigint not null,
            gas_used bigint not null,
            storage_limit bigint not null,
            storage_used bigint not null,
            status tz.operation_status not null,
            errors jsonb,
            account_ids bigint[] not null,
            content jsonb not null
        );
        create index on tz.{t}(level);
        create index on tz.{t}(sender_id);
        create index on tz.{t}(hash);
        create index on tz.{t} using gin(account_ids);
        "
    )
}

/// Statements creating the operation tables, the union view and cause foreign keys.
pub(super) fn ddl() -> String {
    let tables = OperationKind::ALL.iter().map(|k| table_ddl(*k)).join("\n");
    let view = OperationKind::ALL
        .iter()
        .map(|k| format!("select {} from tz.{}", COLUMNS.join(", "), k.table_name()))
        .join("\nunion all\n");
    let causes = CAUSES
        .iter()
        .map(|(log, kind)| {
            format!(
                "alter table tz.{log} add foreign key ({kind}_id)
                    references tz.{}(id) on delete cascade deferrable initially deferred;
                create index on tz.{log}({kind}_id);",
                kind.table_name()
            )
        })
        .join("\n");
    format!("{tables}\ncreate view tz.operations as\n{view};\n{causes}")
}

pub(super) fn read(row: &tokio_postgres::Row) -> Result<Operation, StoreError> {
    let content: Json<Content<i64>> = row.try_get("content")?;
    let envelope = Envelope {
        hash: row.try_get("hash")?,
        sender: row.try_get("sender_id")?,
        initiator: row.try_get("initiator_id")?,
        nonce: row.try_get("nonce")?,
        counter: row.try_get("counter")?,
        fees: Fees {
            baker_fee: row.try_get("baker_fee")?,
            storage_fee: row.try_get("storage_fee")?,
            allocation_fee: row.try_get("allocation_fee")?,
        },
        usage: Usage {
            gas_limit: row.try_get("gas_limit")?,
            gas_used: row.try_get("gas_used")?,
            storage_limit: row.try_get("storage_limit")?,
            storage_used: row.try_get("storage_used")?,
        },
        status: row.try_get("status")?,
        errors: row.try_get("errors")?,
    };
    Ok(Operation::new(
        row.try_get("id")?,
        row.try_get("level")?,
        row.try_get("timestamp")?,
        envelope,
        content.0,
    ))
}

pub(super) fn params(op: &Operation) -> Result<Vec<Param>, StoreError> {
    let e = &op.envelope;
    Ok(vec![
        param(op.id),
        param(op.level),
        param(op.timestamp),
        param(e.hash.clone()),
        param(e.sender),
        param(e.initiator),
        param(e.nonce),
        param(e.counter),
        param(e.fees.baker_fee),
        param(e.fees.storage_fee),
        param(e.fees.allocation_fee),
        param(e.usage.gas_limit),
        param(e.usage.gas_used),
        param(e.usage.storage_limit),
        param(e.usage.storage_used),
        param(e.status),
        param(e.errors.clone()),
        param(op.account_ids.clone()),
        param(serde_json::to_value(&op.content)?),
    ])
}

/// Upsert into the table of the operation's kind.
pub(super) fn upsert_stmt(op: &Operation) -> String {
    let placeholders = (1..=COLUMNS.len()).map(|i| format!("${i}")).join(", ");
    let updates = COLUMNS
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .join(", ");
    format!(
        "insert into tz.{} ({}) values ({placeholders}) on conflict (id) do update set {updates};",
        op.kind().table_name(),
        COLUMNS.join(", "),
    )
}

/// Deletes an operation from its kind's table, returning the number of deleted rows.
pub(super) async fn delete(pgtx: &Transaction<'_>, id: OperationId) -> Result<u64, StoreError> {
    let qry = "select content->>'kind' from tz.operations where id = $1;";
    let kind: String = match pgtx.query_opt(qry, &[&id]).await? {
        Some(row) => row.try_get(0)?,
        None => return Ok(0),
    };
    let kind: OperationKind = kind.parse().map_err(StoreError::Corrupt)?;
    let stmt = format!("delete from tz.{} where id = $1;", kind.table_name());
    Ok(pgtx.execute(&stmt, &[&id]).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_covers_every_kind() {
        let sql = ddl();
        for kind in OperationKind::ALL {
            assert!(sql.contains(&format!("create table tz.{} (", kind.table_name())));
        }
        assert!(sql.contains("references tz.transfer_ticket_ops(id)"));
        assert_eq!(sql.matches("union all").count(), OperationKind::ALL.len() - 1);
    }
}
