use super::numeric_param;
use super::param;
use super::read_numeric;
use super::Param;
use crate::schema::Token;
use crate::schema::TokenBalance;
use crate::schema::TokenTransfer;
use crate::schema::TokenTransferCause;
use crate::store::StoreError;

pub(super) const TOKEN_COLUMNS: &[&str] = &[
    "id",
    "contract_id",
    "token_id",
    "standard",
    "first_level",
    "last_level",
    "transfers_count",
    "balances_count",
    "holders_count",
    "total_minted",
    "total_burned",
    "total_supply",
];

pub(super) const TOKEN_NUMERIC: &[&str] = &["total_minted", "total_burned", "total_supply"];

pub(super) const BALANCE_COLUMNS: &[&str] = &[
    "id",
    "token_id",
    "contract_id",
    "account_id",
    "balance",
    "first_level",
    "last_level",
    "transfers_count",
];

pub(super) const TRANSFER_COLUMNS: &[&str] = &[
    "id",
    "level",
    "token_id",
    "from_id",
    "to_id",
    "amount",
    "origination_id",
    "transaction_id",
    "migration_id",
];

pub(super) fn read_token(row: &tokio_postgres::Row) -> Result<Token, StoreError> {
    Ok(Token {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        token_id: row.try_get("token_id")?,
        standard: row.try_get("standard")?,
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

pub(super) fn token_params(t: &Token) -> Vec<Param> {
    vec![
        param(t.id),
        param(t.contract_id),
        param(t.token_id.clone()),
        param(t.standard),
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

pub(super) fn read_balance(row: &tokio_postgres::Row) -> Result<TokenBalance, StoreError> {
    Ok(TokenBalance {
        id: row.try_get("id")?,
        token_id: row.try_get("token_id")?,
        contract_id: row.try_get("contract_id")?,
        account_id: row.try_get("account_id")?,
        balance: read_numeric(row, "balance")?,
        first_level: row.try_get("first_level")?,
        last_level: row.try_get("last_level")?,
        transfers_count: row.try_get("transfers_count")?,
    })
}

pub(super) fn balance_params(b: &TokenBalance) -> Vec<Param> {
    vec![
        param(b.id),
        param(b.token_id),
        param(b.contract_id),
        param(b.account_id),
        numeric_param(&b.balance),
        param(b.first_level),
        param(b.last_level),
        param(b.transfers_count),
    ]
}

pub(super) fn read_transfer(row: &tokio_postgres::Row) -> Result<TokenTransfer, StoreError> {
    let origination: Option<i64> = row.try_get("origination_id")?;
    let transaction: Option<i64> = row.try_get("transaction_id")?;
    let migration: Option<i64> = row.try_get("migration_id")?;
    let cause = match (origination, transaction, migration) {
        (Some(id), None, None) => TokenTransferCause::Origination(id),
        (None, Some(id), None) => TokenTransferCause::Transaction(id),
        (None, None, Some(id)) => TokenTransferCause::Migration(id),
        _ => {
            return Err(StoreError::Corrupt(String::from(
                "ambiguous token transfer cause",
            )))
        }
    };
    Ok(TokenTransfer {
        id: row.try_get("id")?,
        level: row.try_get("level")?,
        token_id: row.try_get("token_id")?,
        from_id: row.try_get("from_id")?,
        to_id: row.try_get("to_id")?,
        amount: read_numeric(row, "amount")?,
        cause,
    })
}

pub(super) fn transfer_params(t: &TokenTransfer) -> Vec<Param> {
    let (origination, transaction, migration) = match t.cause {
        TokenTransferCause::Origination(id) => (Some(id), None, None),
        TokenTransferCause::Transaction(id) => (None, Some(id), None),
        TokenTransferCause::Migration(id) => (None, None, Some(id)),
    };
    vec![
        param(t.id),
        param(t.level),
        param(t.token_id),
        param(t.from_id),
        param(t.to_id),
        numeric_param(&t.amount),
        param(origination),
        param(transaction),
        param(migration),
    ]
}
