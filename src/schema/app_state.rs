use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

use super::operations::OperationKind;
use super::rows::Table;
use crate::core::types::BlockHash;
use crate::core::types::Cycle;
use crate::core::types::Head;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::ProtocolHash;
use crate::core::types::Timestamp;

/// Row counts per operation kind.
///
/// Kinds with a zero count are not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpsCounts(BTreeMap<OperationKind, i64>);

impl OpsCounts {
    pub fn get(&self, kind: OperationKind) -> i64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    /// Adds `delta` to the count of `kind`.
    ///
    /// Returns false, leaving counts untouched, if the count would become negative.
    pub fn add(&mut self, kind: OperationKind, delta: i64) -> bool {
        let value = self.get(kind) + delta;
        if value < 0 {
            return false;
        }
        if value == 0 {
            self.0.remove(&kind);
        } else {
            self.0.insert(kind, value);
        }
        true
    }

    pub fn total(&self) -> i64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperationKind, i64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(OperationKind, i64)> for OpsCounts {
    fn from_iter<T: IntoIterator<Item = (OperationKind, i64)>>(iter: T) -> Self {
        let mut counts = Self::default();
        for (kind, n) in iter {
            counts.add(kind, n);
        }
        counts
    }
}

/// Id generators and row counters held by the singleton `AppState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    Block,
    Cycle,
    VotingPeriod,
    Account,
    Operation,
    Protocol,
    BigMap,
    BigMapKey,
    BigMapUpdate,
    Ticket,
    TicketBalance,
    TicketTransfer,
    Token,
    TokenBalance,
    TokenTransfer,
    BakerCycle,
    DelegatorCycle,
    SnapshotBalance,
    Statistics,
    VotingSnapshot,
    Proposal,
    StakingUpdate,
    UnstakeRequest,
}

impl Counter {
    pub const ALL: [Counter; 23] = [
        Self::Block,
        Self::Cycle,
        Self::VotingPeriod,
        Self::Account,
        Self::Operation,
        Self::Protocol,
        Self::BigMap,
        Self::BigMapKey,
        Self::BigMapUpdate,
        Self::Ticket,
        Self::TicketBalance,
        Self::TicketTransfer,
        Self::Token,
        Self::TokenBalance,
        Self::TokenTransfer,
        Self::BakerCycle,
        Self::DelegatorCycle,
        Self::SnapshotBalance,
        Self::Statistics,
        Self::VotingSnapshot,
        Self::Proposal,
        Self::StakingUpdate,
        Self::UnstakeRequest,
    ];

    /// Counters that hand out row ids, as opposed to plain row counts.
    pub fn allocates_ids(&self) -> bool {
        !matches!(self, Self::Block | Self::Cycle | Self::VotingPeriod)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Block => "blocks",
            Self::Cycle => "cycles",
            Self::VotingPeriod => "voting_periods",
            Self::Account => "accounts",
            Self::Operation => "operations",
            Self::Protocol => "protocols",
            Self::BigMap => "big_maps",
            Self::BigMapKey => "big_map_keys",
            Self::BigMapUpdate => "big_map_updates",
            Self::Ticket => "tickets",
            Self::TicketBalance => "ticket_balances",
            Self::TicketTransfer => "ticket_transfers",
            Self::Token => "tokens",
            Self::TokenBalance => "token_balances",
            Self::TokenTransfer => "token_transfers",
            Self::BakerCycle => "baker_cycles",
            Self::DelegatorCycle => "delegator_cycles",
            Self::SnapshotBalance => "snapshot_balances",
            Self::Statistics => "statistics",
            Self::VotingSnapshot => "voting_snapshots",
            Self::Proposal => "proposals",
            Self::StakingUpdate => "staking_updates",
            Self::UnstakeRequest => "unstake_requests",
        }
    }

    /// Table whose rows the counter counts.
    pub fn table(&self) -> Table {
        match self {
            Self::Block => Table::Block,
            Self::Cycle => Table::Cycle,
            Self::VotingPeriod => Table::VotingPeriod,
            Self::Account => Table::Account,
            Self::Operation => Table::Operation,
            Self::Protocol => Table::Protocol,
            Self::BigMap => Table::BigMap,
            Self::BigMapKey => Table::BigMapKey,
            Self::BigMapUpdate => Table::BigMapUpdate,
            Self::Ticket => Table::Ticket,
            Self::TicketBalance => Table::TicketBalance,
            Self::TicketTransfer => Table::TicketTransfer,
            Self::Token => Table::Token,
            Self::TokenBalance => Table::TokenBalance,
            Self::TokenTransfer => Table::TokenTransfer,
            Self::BakerCycle => Table::BakerCycle,
            Self::DelegatorCycle => Table::DelegatorCycle,
            Self::SnapshotBalance => Table::SnapshotBalance,
            Self::Statistics => Table::Statistics,
            Self::VotingSnapshot => Table::VotingSnapshot,
            Self::Proposal => Table::Proposal,
            Self::StakingUpdate => Table::StakingUpdate,
            Self::UnstakeRequest => Table::UnstakeRequest,
        }
    }
}

/// Process-wide aggregate: chain head, id generators and running totals.
///
/// Stored as a single row with id `APP_STATE_ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub level: Level,
    pub hash: BlockHash,
    pub timestamp: Timestamp,
    pub cycle: Cycle,
    pub protocol: ProtocolHash,
    pub proto_code: i32,
    pub voting_period: i32,
    pub voting_epoch: i32,

    pub blocks_count: i64,
    pub cycles_count: i64,
    pub voting_periods_count: i64,
    pub account_counter: i64,
    pub operation_counter: i64,
    pub protocol_counter: i64,
    pub big_map_counter: i64,
    pub big_map_key_counter: i64,
    pub big_map_update_counter: i64,
    pub ticket_counter: i64,
    pub ticket_balance_counter: i64,
    pub ticket_transfer_counter: i64,
    pub token_counter: i64,
    pub token_balance_counter: i64,
    pub token_transfer_counter: i64,
    pub baker_cycle_counter: i64,
    pub delegator_cycle_counter: i64,
    pub snapshot_balance_counter: i64,
    pub statistics_counter: i64,
    pub voting_snapshot_counter: i64,
    pub proposal_counter: i64,
    pub staking_update_counter: i64,
    pub unstake_request_counter: i64,

    pub ops_counts: OpsCounts,

    /// Minted by the protocol: block rewards, bonuses, endorsing and revelation rewards.
    pub total_created: Mutez,
    pub total_burned: Mutez,
    /// Credited by fundraiser activations.
    pub total_activated: Mutez,
    /// Staked and unstaked balances.
    pub total_frozen: Mutez,
    pub total_rollup_bonds: Mutez,
}

impl AppState {
    /// State of an empty index.
    pub fn initial() -> Self {
        let head = Head::initial();
        Self {
            level: head.level,
            hash: head.hash,
            timestamp: 0,
            cycle: -1,
            protocol: String::new(),
            proto_code: 0,
            voting_period: -1,
            voting_epoch: -1,
            blocks_count: 0,
            cycles_count: 0,
            voting_periods_count: 0,
            account_counter: 0,
            operation_counter: 0,
            protocol_counter: 0,
            big_map_counter: 0,
            big_map_key_counter: 0,
            big_map_update_counter: 0,
            ticket_counter: 0,
            ticket_balance_counter: 0,
            ticket_transfer_counter: 0,
            token_counter: 0,
            token_balance_counter: 0,
            token_transfer_counter: 0,
            baker_cycle_counter: 0,
            delegator_cycle_counter: 0,
            snapshot_balance_counter: 0,
            statistics_counter: 0,
            voting_snapshot_counter: 0,
            proposal_counter: 0,
            staking_update_counter: 0,
            unstake_request_counter: 0,
            ops_counts: OpsCounts::default(),
            total_created: 0,
            total_burned: 0,
            total_activated: 0,
            total_frozen: 0,
            total_rollup_bonds: 0,
        }
    }

    pub fn head(&self) -> Head {
        Head::new(self.level, self.hash.clone())
    }

    pub fn counter(&self, counter: Counter) -> i64 {
        match counter {
            Counter::Block => self.blocks_count,
            Counter::Cycle => self.cycles_count,
            Counter::VotingPeriod => self.voting_periods_count,
            Counter::Account => self.account_counter,
            Counter::Operation => self.operation_counter,
            Counter::Protocol => self.protocol_counter,
            Counter::BigMap => self.big_map_counter,
            Counter::BigMapKey => self.big_map_key_counter,
            Counter::BigMapUpdate => self.big_map_update_counter,
            Counter::Ticket => self.ticket_counter,
            Counter::TicketBalance => self.ticket_balance_counter,
            Counter::TicketTransfer => self.ticket_transfer_counter,
            Counter::Token => self.token_counter,
            Counter::TokenBalance => self.token_balance_counter,
            Counter::TokenTransfer => self.token_transfer_counter,
            Counter::BakerCycle => self.baker_cycle_counter,
            Counter::DelegatorCycle => self.delegator_cycle_counter,
            Counter::SnapshotBalance => self.snapshot_balance_counter,
            Counter::Statistics => self.statistics_counter,
            Counter::VotingSnapshot => self.voting_snapshot_counter,
            Counter::Proposal => self.proposal_counter,
            Counter::StakingUpdate => self.staking_update_counter,
            Counter::UnstakeRequest => self.unstake_request_counter,
        }
    }

    pub fn counter_mut(&mut self, counter: Counter) -> &mut i64 {
        match counter {
            Counter::Block => &mut self.blocks_count,
            Counter::Cycle => &mut self.cycles_count,
            Counter::VotingPeriod => &mut self.voting_periods_count,
            Counter::Account => &mut self.account_counter,
            Counter::Operation => &mut self.operation_counter,
            Counter::Protocol => &mut self.protocol_counter,
            Counter::BigMap => &mut self.big_map_counter,
            Counter::BigMapKey => &mut self.big_map_key_counter,
            Counter::BigMapUpdate => &mut self.big_map_update_counter,
            Counter::Ticket => &mut self.ticket_counter,
            Counter::TicketBalance => &mut self.ticket_balance_counter,
            Counter::TicketTransfer => &mut self.ticket_transfer_counter,
            Counter::Token => &mut self.token_counter,
            Counter::TokenBalance => &mut self.token_balance_counter,
            Counter::TokenTransfer => &mut self.token_transfer_counter,
            Counter::BakerCycle => &mut self.baker_cycle_counter,
            Counter::DelegatorCycle => &mut self.delegator_cycle_counter,
            Counter::SnapshotBalance => &mut self.snapshot_balance_counter,
            Counter::Statistics => &mut self.statistics_counter,
            Counter::VotingSnapshot => &mut self.voting_snapshot_counter,
            Counter::Proposal => &mut self.proposal_counter,
            Counter::StakingUpdate => &mut self.staking_update_counter,
            Counter::UnstakeRequest => &mut self.unstake_request_counter,
        }
    }

    /// Total supply, frozen funds included.
    pub fn total_supply(&self) -> Mutez {
        self.total_created + self.total_activated - self.total_burned
    }

    pub fn circulating_supply(&self) -> Mutez {
        self.total_supply() - self.total_frozen - self.total_rollup_bonds
    }
}
