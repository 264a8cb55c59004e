use num_bigint::BigInt;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::Level;
use crate::core::types::OperationId;
use crate::core::types::RowId;

/// Ticket movement reported by the decoder.
///
/// A missing sender is a mint, a missing receiver a burn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMovement {
    pub ticketer: Address,
    pub content_type: Value,
    pub content: Value,
    pub content_hash: String,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(with = "super::amount_str")]
    pub amount: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: RowId,
    pub ticketer_id: AccountId,
    pub content_hash: String,
    pub content_type: Value,
    pub content: Value,
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
pub struct TicketBalance {
    pub id: RowId,
    pub ticket_id: RowId,
    pub ticketer_id: AccountId,
    pub account_id: AccountId,
    pub balance: BigInt,
    pub first_level: Level,
    pub last_level: Level,
    pub transfers_count: i32,
}

/// Operation a ticket transfer originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketTransferCause {
    Transaction(OperationId),
    TransferTicket(OperationId),
    SmartRollupExecute(OperationId),
    Migration(OperationId),
}

impl TicketTransferCause {
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Transaction(id)
            | Self::TransferTicket(id)
            | Self::SmartRollupExecute(id)
            | Self::Migration(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketTransfer {
    pub id: RowId,
    pub level: Level,
    pub ticket_id: RowId,
    pub from_id: Option<AccountId>,
    pub to_id: Option<AccountId>,
    pub amount: BigInt,
    pub cause: TicketTransferCause,
}
