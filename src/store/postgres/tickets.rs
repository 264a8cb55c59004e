use super::numeric_param;
use super::param;
use super::read_numeric;
use super::Param;
use crate::schema::Ticket;
use crate::schema::TicketBalance;
use crate::schema::TicketTransfer;
use crate::schema::TicketTransferCause;
use crate::store::StoreError;

pub(super) const TICKET_COLUMNS: &[&str] = &[
    "id",
    "ticketer_id",
    "content_hash",
    "content_type",
    "content",
    "first_level",
    "last_level",
    "transfers_count",
    "balances_count",
    "holders_count",
    "total_minted",
    "total_burned",
    "total_supply",
];

pub(super) const TICKET_NUMERIC: &[&str] = &["total_minted", "total_burned", "total_supply"];

pub(super) const BALANCE_COLUMNS: &[&str] = &[
    "id",
    "ticket_id",
    "ticketer_id",
    "account_id",
    "balance",
    "first_level",
    "last_level",
    "transfers_count",
];

pub(super) const TRANSFER_COLUMNS: &[&str] = &[
    "id",
    "level",
    "ticket_id",
    "from_id",
    "to_id",
    "amount",
    "transaction_id",
    "transfer_ticket_id",
    "smart_rollup_execute_id",
    "migration_id",
];

pub(super) fn read_ticket(row: &tokio_postgres::Row) -> Result<Ticket, StoreError> {
    Ok(Ticket {
        id: row.try_get("id")?,
        ticketer_id: row.try_get("ticketer_id")?,
        content_hash: row.try_get("content_hash")?,
        content_type: row.try_get("content_type")?,
        content: row.try_get("content")?,
        first_level: row.try_get("first_level")?,
        last_level: row.try_get("last_level")?,
        transfers_count: row.try_get("transfers_count")?,
        balances_count: row.try_get("balances_count")?,
        holders_count: row.try_get("holders_count")?,
        total_minted: read_numeric(row, "total_minted")?,
        total_burned: read_numeric(row, "total_burned")?,
        total_supply: read_numeric(row, "total_supply")?,
    })
}

pub(super) fn ticket_params(t: &Ticket) -> Vec<Param> {
    vec![
        param(t.id),
        param(t.ticketer_id),
        param(t.content_hash.clone()),
        param(t.content_type.clone()),
        param(t.content.clone()),
        param(t.first_level),
        param(t.last_level),
        param(t.transfers_count),
        param(t.balances_count),
        param(t.holders_count),
        numeric_param(&t.total_minted),
        numeric_param(&t.total_burned),
        numeric_param(&t.total_supply),
    ]
}

pub(super) fn read_balance(row: &tokio_postgres::Row) -> Result<TicketBalance, StoreError> {
    Ok(TicketBalance {
        id: row.try_get("id")?,
        ticket_id: row.try_get("ticket_id")?,
        ticketer_id: row.try_get("ticketer_id")?,
        account_id: row.try_get("account_id")?,
        balance: read_numeric(row, "balance")?,
        first_level: row.try_get("first_level")?,
        last_level: row.try_get("last_level")?,
        transfers_count: row.try_get("transfers_count")?,
    })
}

pub(super) fn balance_params(b: &TicketBalance) -> Vec<Param> {
    vec![
        param(b.id),
        param(b.ticket_id),
        param(b.ticketer_id),
        param(b.account_id),
        numeric_param(&b.balance),
        param(b.first_level),
        param(b.last_level),
        param(b.transfers_count),
    ]
}

pub(super) fn read_transfer(row: &tokio_postgres::Row) -> Result<TicketTransfer, StoreError> {
    let causes: [Option<i64>; 4] = [
        row.try_get("transaction_id")?,
        row.try_get("transfer_ticket_id")?,
        row.try_get("smart_rollup_execute_id")?,
        row.try_get("migration_id")?,
    ];
    let cause = match causes {
        [Some(id), None, None, None] => TicketTransferCause::Transaction(id),
        [None, Some(id), None, None] => TicketTransferCause::TransferTicket(id),
        [None, None, Some(id), None] => TicketTransferCause::SmartRollupExecute(id),
        [None, None, None, Some(id)] => TicketTransferCause::Migration(id),
        _ => {
            return Err(StoreError::Corrupt(String::from(
                "ambiguous ticket transfer cause",
            )))
        }
    };
    Ok(TicketTransfer {
        id: row.try_get("id")?,
        level: row.try_get("level")?,
        ticket_id: row.try_get("ticket_id")?,
        from_id: row.try_get("from_id")?,
        to_id: row.try_get("to_id")?,
        amount: read_numeric(row, "amount")?,
        cause,
    })
}

pub(super) fn transfer_params(t: &TicketTransfer) -> Vec<Param> {
    let mut causes: [Option<i64>; 4] = [None; 4];
    match t.cause {
        TicketTransferCause::Transaction(id) => causes[0] = Some(id),
        TicketTransferCause::TransferTicket(id) => causes[1] = Some(id),
        TicketTransferCause::SmartRollupExecute(id) => causes[2] = Some(id),
        TicketTransferCause::Migration(id) => causes[3] = Some(id),
    }
    let mut params = vec![
        param(t.id),
        param(t.level),
        param(t.ticket_id),
        param(t.from_id),
        param(t.to_id),
        numeric_param(&t.amount),
    ];
    params.extend(causes.into_iter().map(param));
    params
}
