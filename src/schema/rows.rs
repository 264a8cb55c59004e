//! Uniform view over all records, used by stores and the unit of work.
use super::accounts::Account;
use super::big_maps::BigMap;
use super::big_maps::BigMapKey;
use super::big_maps::BigMapUpdate;
use super::blocks::Block;
use super::blocks::Protocol;
use super::cycles::BakerCycle;
use super::cycles::Cycle;
use super::cycles::DelegatorCycle;
use super::cycles::SnapshotBalance;
use super::cycles::Statistics;
use super::operations::Operation;
use super::staking::StakingUpdate;
use super::staking::UnstakeRequest;
use super::tickets::Ticket;
use super::tickets::TicketBalance;
use super::tickets::TicketTransfer;
use super::tokens::Token;
use super::tokens::TokenBalance;
use super::tokens::TokenTransfer;
use super::voting::Proposal;
use super::voting::VotingPeriod;
use super::voting::VotingSnapshot;
use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::Cycle as CycleIndex;
use crate::core::types::Level;
use crate::core::types::ProtocolHash;
use crate::core::types::RowId;

/// A typed record that can be stored as a `Row`.
pub trait Entity: Clone + Into<Row> + Send + Sync + 'static {
    const TABLE: Table;

    fn key(&self) -> RowKey;
    fn from_row(row: Row) -> Option<Self>;
    fn from_row_ref(row: &Row) -> Option<&Self>;
}

macro_rules! catalog {
    ($($name:ident($ty:ty) => |$e:ident| $key:expr;)+) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum Row {
            $($name($ty),)+
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Table {
            $($name,)+
        }

        impl Table {
            pub const ALL: &'static [Table] = &[$(Table::$name,)+];
        }

        impl Row {
            pub fn table(&self) -> Table {
                match self {
                    $(Row::$name(_) => Table::$name,)+
                }
            }

            pub fn key(&self) -> RowKey {
                match self {
                    $(Row::$name(r) => r.key(),)+
                }
            }
        }

        $(
            impl From<$ty> for Row {
                fn from(r: $ty) -> Self {
                    Row::$name(r)
                }
            }

            impl Entity for $ty {
                const TABLE: Table = Table::$name;

                fn key(&self) -> RowKey {
                    let $e = self;
                    $key
                }

                #[allow(unreachable_patterns)]
                fn from_row(row: Row) -> Option<Self> {
                    match row {
                        Row::$name(r) => Some(r),
                        _ => None,
                    }
                }

                #[allow(unreachable_patterns)]
                fn from_row_ref(row: &Row) -> Option<&Self> {
                    match row {
                        Row::$name(r) => Some(r),
                        _ => None,
                    }
                }
            }
        )+
    };
}

catalog! {
    Protocol(Protocol) => |r| RowKey::Protocol(r.code);
    Block(Block) => |r| RowKey::Block(r.level);
    Account(Account) => |r| RowKey::Account(r.id);
    Operation(Operation) => |r| RowKey::Operation(r.id);
    BigMap(BigMap) => |r| RowKey::BigMap(r.id);
    BigMapKey(BigMapKey) => |r| RowKey::BigMapKey(r.id);
    BigMapUpdate(BigMapUpdate) => |r| RowKey::BigMapUpdate(r.id);
    Ticket(Ticket) => |r| RowKey::Ticket(r.id);
    TicketBalance(TicketBalance) => |r| RowKey::TicketBalance(r.id);
    TicketTransfer(TicketTransfer) => |r| RowKey::TicketTransfer(r.id);
    Token(Token) => |r| RowKey::Token(r.id);
    TokenBalance(TokenBalance) => |r| RowKey::TokenBalance(r.id);
    TokenTransfer(TokenTransfer) => |r| RowKey::TokenTransfer(r.id);
    Cycle(Cycle) => |r| RowKey::Cycle(r.index);
    BakerCycle(BakerCycle) => |r| RowKey::BakerCycle(r.id);
    DelegatorCycle(DelegatorCycle) => |r| RowKey::DelegatorCycle(r.id);
    SnapshotBalance(SnapshotBalance) => |r| RowKey::SnapshotBalance(r.id);
    Statistics(Statistics) => |r| RowKey::Statistics(r.id);
    VotingPeriod(VotingPeriod) => |r| RowKey::VotingPeriod(r.index);
    VotingSnapshot(VotingSnapshot) => |r| RowKey::VotingSnapshot(r.id);
    Proposal(Proposal) => |r| RowKey::Proposal(r.id);
    StakingUpdate(StakingUpdate) => |r| RowKey::StakingUpdate(r.id);
    UnstakeRequest(UnstakeRequest) => |r| RowKey::UnstakeRequest(r.id);
}

/// Primary key of a row, table included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Protocol(i32),
    Block(Level),
    Account(AccountId),
    Operation(i64),
    BigMap(RowId),
    BigMapKey(RowId),
    BigMapUpdate(RowId),
    Ticket(RowId),
    TicketBalance(RowId),
    TicketTransfer(RowId),
    Token(RowId),
    TokenBalance(RowId),
    TokenTransfer(RowId),
    Cycle(CycleIndex),
    BakerCycle(RowId),
    DelegatorCycle(RowId),
    SnapshotBalance(RowId),
    Statistics(RowId),
    VotingPeriod(i32),
    VotingSnapshot(RowId),
    Proposal(RowId),
    StakingUpdate(RowId),
    UnstakeRequest(RowId),
}

impl RowKey {
    pub fn table(&self) -> Table {
        match self {
            Self::Protocol(_) => Table::Protocol,
            Self::Block(_) => Table::Block,
            Self::Account(_) => Table::Account,
            Self::Operation(_) => Table::Operation,
            Self::BigMap(_) => Table::BigMap,
            Self::BigMapKey(_) => Table::BigMapKey,
            Self::BigMapUpdate(_) => Table::BigMapUpdate,
            Self::Ticket(_) => Table::Ticket,
            Self::TicketBalance(_) => Table::TicketBalance,
            Self::TicketTransfer(_) => Table::TicketTransfer,
            Self::Token(_) => Table::Token,
            Self::TokenBalance(_) => Table::TokenBalance,
            Self::TokenTransfer(_) => Table::TokenTransfer,
            Self::Cycle(_) => Table::Cycle,
            Self::BakerCycle(_) => Table::BakerCycle,
            Self::DelegatorCycle(_) => Table::DelegatorCycle,
            Self::SnapshotBalance(_) => Table::SnapshotBalance,
            Self::Statistics(_) => Table::Statistics,
            Self::VotingPeriod(_) => Table::VotingPeriod,
            Self::VotingSnapshot(_) => Table::VotingSnapshot,
            Self::Proposal(_) => Table::Proposal,
            Self::StakingUpdate(_) => Table::StakingUpdate,
            Self::UnstakeRequest(_) => Table::UnstakeRequest,
        }
    }

    /// Numeric part of the key.
    pub fn id(&self) -> i64 {
        match *self {
            Self::Protocol(id) | Self::Block(id) | Self::Cycle(id) | Self::VotingPeriod(id) => {
                id as i64
            }
            Self::Account(id)
            | Self::Operation(id)
            | Self::BigMap(id)
            | Self::BigMapKey(id)
            | Self::BigMapUpdate(id)
            | Self::Ticket(id)
            | Self::TicketBalance(id)
            | Self::TicketTransfer(id)
            | Self::Token(id)
            | Self::TokenBalance(id)
            | Self::TokenTransfer(id)
            | Self::BakerCycle(id)
            | Self::DelegatorCycle(id)
            | Self::SnapshotBalance(id)
            | Self::Statistics(id)
            | Self::VotingSnapshot(id)
            | Self::Proposal(id)
            | Self::StakingUpdate(id)
            | Self::UnstakeRequest(id) => id,
        }
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.table().name(), self.id())
    }
}

impl Table {
    /// Name of the backing table.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Protocol => "protocols",
            Self::Block => "blocks",
            Self::Account => "accounts",
            Self::Operation => "operations",
            Self::BigMap => "big_maps",
            Self::BigMapKey => "big_map_keys",
            Self::BigMapUpdate => "big_map_updates",
            Self::Ticket => "tickets",
            Self::TicketBalance => "ticket_balances",
            Self::TicketTransfer => "ticket_transfers",
            Self::Token => "tokens",
            Self::TokenBalance => "token_balances",
            Self::TokenTransfer => "token_transfers",
            Self::Cycle => "cycles",
            Self::BakerCycle => "baker_cycles",
            Self::DelegatorCycle => "delegator_cycles",
            Self::SnapshotBalance => "snapshot_balances",
            Self::Statistics => "statistics",
            Self::VotingPeriod => "voting_periods",
            Self::VotingSnapshot => "voting_snapshots",
            Self::Proposal => "proposals",
            Self::StakingUpdate => "staking_updates",
            Self::UnstakeRequest => "unstake_requests",
        }
    }

    /// Rows of tables with a level foreign key go away with their block.
    pub fn cascades(&self) -> bool {
        matches!(
            self,
            Self::Operation
                | Self::BigMapUpdate
                | Self::TicketTransfer
                | Self::TokenTransfer
                | Self::Cycle
                | Self::BakerCycle
                | Self::DelegatorCycle
                | Self::SnapshotBalance
                | Self::Statistics
                | Self::VotingPeriod
                | Self::VotingSnapshot
                | Self::StakingUpdate
        )
    }
}

impl Row {
    /// Level the row is attached to: its creation level for current-state rows.
    pub fn level(&self) -> Level {
        match self {
            Self::Protocol(r) => r.first_level,
            Self::Block(r) => r.level,
            Self::Account(r) => r.first_level,
            Self::Operation(r) => r.level,
            Self::BigMap(r) => r.first_level,
            Self::BigMapKey(r) => r.first_level,
            Self::BigMapUpdate(r) => r.level,
            Self::Ticket(r) => r.first_level,
            Self::TicketBalance(r) => r.first_level,
            Self::TicketTransfer(r) => r.level,
            Self::Token(r) => r.first_level,
            Self::TokenBalance(r) => r.first_level,
            Self::TokenTransfer(r) => r.level,
            Self::Cycle(r) => r.level,
            Self::BakerCycle(r) => r.level,
            Self::DelegatorCycle(r) => r.level,
            Self::SnapshotBalance(r) => r.level,
            Self::Statistics(r) => r.level,
            Self::VotingPeriod(r) => r.level,
            Self::VotingSnapshot(r) => r.level,
            Self::Proposal(r) => r.first_level,
            Self::StakingUpdate(r) => r.level,
            Self::UnstakeRequest(r) => r.first_level,
        }
    }

    /// Unique secondary keys of the row.
    pub fn index_keys(&self) -> Vec<IndexKey> {
        match self {
            Self::Account(r) => vec![IndexKey::AccountAddress(r.address.clone())],
            Self::Protocol(r) => vec![IndexKey::ProtocolHash(r.hash.clone())],
            Self::BigMap(r) => vec![IndexKey::BigMapPtr(r.ptr)],
            Self::BigMapKey(r) => vec![IndexKey::BigMapKey {
                big_map_id: r.big_map_id,
                key_hash: r.key_hash.clone(),
            }],
            Self::Ticket(r) => vec![IndexKey::Ticket {
                ticketer_id: r.ticketer_id,
                content_hash: r.content_hash.clone(),
            }],
            Self::TicketBalance(r) => vec![IndexKey::TicketBalance {
                ticket_id: r.ticket_id,
                account_id: r.account_id,
            }],
            Self::Token(r) => vec![IndexKey::Token {
                contract_id: r.contract_id,
                token_id: r.token_id.clone(),
            }],
            Self::TokenBalance(r) => vec![IndexKey::TokenBalance {
                token_id: r.token_id,
                account_id: r.account_id,
            }],
            Self::BakerCycle(r) => vec![IndexKey::BakerCycle {
                cycle: r.cycle,
                baker_id: r.baker_id,
            }],
            Self::VotingSnapshot(r) => vec![IndexKey::VotingSnapshot {
                period: r.period,
                baker_id: r.baker_id,
            }],
            Self::Proposal(r) => vec![IndexKey::Proposal {
                epoch: r.epoch,
                hash: r.hash.clone(),
            }],
            Self::UnstakeRequest(r) => vec![IndexKey::UnstakeRequest {
                cycle: r.cycle,
                baker_id: r.baker_id,
                staker_id: r.staker_id,
            }],
            _ => vec![],
        }
    }
}

/// Unique secondary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    AccountAddress(Address),
    ProtocolHash(ProtocolHash),
    BigMapPtr(i64),
    BigMapKey {
        big_map_id: RowId,
        key_hash: String,
    },
    Ticket {
        ticketer_id: AccountId,
        content_hash: String,
    },
    TicketBalance {
        ticket_id: RowId,
        account_id: AccountId,
    },
    Token {
        contract_id: AccountId,
        token_id: String,
    },
    TokenBalance {
        token_id: RowId,
        account_id: AccountId,
    },
    BakerCycle {
        cycle: CycleIndex,
        baker_id: AccountId,
    },
    VotingSnapshot {
        period: i32,
        baker_id: AccountId,
    },
    Proposal {
        epoch: i32,
        hash: ProtocolHash,
    },
    UnstakeRequest {
        cycle: CycleIndex,
        baker_id: AccountId,
        staker_id: AccountId,
    },
}

/// Current-state row whose `last_level` is derived from logged activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subject {
    /// Operations referencing the account and blocks it baked
    Account(AccountId),
    BigMap(RowId),
    BigMapKey(RowId),
    Ticket(RowId),
    TicketBalance(RowId),
    Token(RowId),
    TokenBalance(RowId),
    UnstakeRequest(RowId),
}

impl Subject {
    pub fn row_key(&self) -> RowKey {
        match *self {
            Self::Account(id) => RowKey::Account(id),
            Self::BigMap(id) => RowKey::BigMap(id),
            Self::BigMapKey(id) => RowKey::BigMapKey(id),
            Self::Ticket(id) => RowKey::Ticket(id),
            Self::TicketBalance(id) => RowKey::TicketBalance(id),
            Self::Token(id) => RowKey::Token(id),
            Self::TokenBalance(id) => RowKey::TokenBalance(id),
            Self::UnstakeRequest(id) => RowKey::UnstakeRequest(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Profile;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entity_round_trip_through_row() {
        let acc = Account::new(5, String::from("tz1x"), 3, Profile::Ghost);
        let row: Row = acc.clone().into();
        assert_eq!(row.table(), Table::Account);
        assert_eq!(row.key(), RowKey::Account(5));
        assert_eq!(row.level(), 3);
        assert_eq!(Account::from_row_ref(&row), Some(&acc));
        assert_eq!(Block::from_row(row.clone()), None);
        assert_eq!(Account::from_row(row), Some(acc));
    }

    #[test]
    fn test_row_keys_order_by_table_then_id() {
        assert!(RowKey::Block(10) < RowKey::Account(1));
        assert!(RowKey::Account(1) < RowKey::Account(2));
        assert_eq!(RowKey::Cycle(4).table(), Table::Cycle);
        assert_eq!(RowKey::Operation(9).to_string(), "operations#9");
    }

    #[test]
    fn test_index_keys() {
        let acc = Account::new(5, String::from("tz1x"), 3, Profile::Ghost);
        assert_eq!(
            Row::from(acc).index_keys(),
            vec![IndexKey::AccountAddress(String::from("tz1x"))]
        );
    }
}
