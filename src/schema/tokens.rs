use num_bigint::BigInt;
use postgres_types::FromSql;
use postgres_types::ToSql;
use serde::Deserialize;
use serde::Serialize;

use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::Level;
use crate::core::types::OperationId;
use crate::core::types::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "token_standard")]
pub enum TokenStandard {
    #[postgres(name = "fa12")]
    Fa12,
    #[postgres(name = "fa2")]
    Fa2,
}

/// Token movement reported by the decoder.
///
/// A missing sender is a mint, a missing receiver a burn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMovement {
    pub contract: Address,
    pub token_id: String,
    pub standard: TokenStandard,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(with = "super::amount_str")]
    pub amount: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: RowId,
    pub contract_id: AccountId,
    /// Token id within its contract
    pub token_id: String,
    pub standard: TokenStandard,
    pub first_level: Level,
    pub last_level: Level,
    pub transfers_count: i32,
    pub balances_count: i32,
    /// Balances above zero
    pub holders_count: i32,
    pub total_minted: BigInt,
    pub total_burned: BigInt,
    pub total_supply: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub id: RowId,
    /// Row id of the token
    pub token_id: RowId,
    pub contract_id: AccountId,
    pub account_id: AccountId,
    pub balance: BigInt,
    pub first_level: Level,
    pub last_level: Level,
    pub transfers_count: i32,
}

/// Operation a token transfer originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenTransferCause {
    Origination(OperationId),
    Transaction(OperationId),
    Migration(OperationId),
}

impl TokenTransferCause {
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Origination(id) | Self::Transaction(id) | Self::Migration(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub id: RowId,
    pub level: Level,
    pub token_id: RowId,
    pub from_id: Option<AccountId>,
    pub to_id: Option<AccountId>,
    pub amount: BigInt,
    pub cause: TokenTransferCause,
}
