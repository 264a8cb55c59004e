use postgres_from_row::FromRow;
use postgres_types::FromSql;
use postgres_types::ToSql;
use serde::Deserialize;
use serde::Serialize;

use crate::core::types::AccountId;
use crate::core::types::Level;
use crate::core::types::ProtocolHash;
use crate::core::types::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "vote")]
pub enum Vote {
    #[postgres(name = "yay")]
    Yay,
    #[postgres(name = "nay")]
    Nay,
    #[postgres(name = "pass")]
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSql, FromSql)]
#[postgres(name = "period_kind")]
pub enum PeriodKind {
    #[postgres(name = "proposal")]
    Proposal,
    #[postgres(name = "exploration")]
    Exploration,
    #[postgres(name = "cooldown")]
    Cooldown,
    #[postgres(name = "promotion")]
    Promotion,
    #[postgres(name = "adoption")]
    Adoption,
}

impl PeriodKind {
    /// Periods holding ballots, as opposed to proposal upvotes.
    pub fn is_ballot_period(&self) -> bool {
        matches!(self, Self::Exploration | Self::Promotion)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSql, FromSql)]
#[postgres(name = "period_status")]
pub enum PeriodStatus {
    #[postgres(name = "active")]
    Active,
    #[postgres(name = "no_proposals")]
    NoProposals,
    #[postgres(name = "no_quorum")]
    NoQuorum,
    #[postgres(name = "no_supermajority")]
    NoSupermajority,
    #[postgres(name = "success")]
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSql, FromSql)]
#[postgres(name = "voter_status")]
pub enum VoterStatus {
    #[postgres(name = "none")]
    None,
    #[postgres(name = "upvoted")]
    Upvoted,
    #[postgres(name = "voted_yay")]
    VotedYay,
    #[postgres(name = "voted_nay")]
    VotedNay,
    #[postgres(name = "voted_pass")]
    VotedPass,
}

impl From<Vote> for VoterStatus {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Yay => Self::VotedYay,
            Vote::Nay => Self::VotedNay,
            Vote::Pass => Self::VotedPass,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct VotingPeriod {
    pub index: i32,
    /// Level the period was opened at
    pub level: Level,
    pub epoch: i32,
    pub kind: PeriodKind,
    pub first_level: Level,
    pub last_level: Level,
    pub status: PeriodStatus,
    pub total_bakers: i32,
    pub total_voting_power: i64,
    pub proposals_count: i32,
    pub top_upvotes: i32,
    pub top_voting_power: i64,
    /// Voting power of distinct upvoters, or of ballots in ballot periods
    pub participation_power: i64,
    pub yay_ballots: i32,
    pub yay_voting_power: i64,
    pub nay_ballots: i32,
    pub nay_voting_power: i64,
    pub pass_ballots: i32,
    pub pass_voting_power: i64,
}

impl VotingPeriod {
    pub fn ballots(&self) -> i32 {
        self.yay_ballots + self.nay_ballots + self.pass_ballots
    }
}

/// Voting power of a baker for a given period.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct VotingSnapshot {
    pub id: RowId,
    pub level: Level,
    pub period: i32,
    pub baker_id: AccountId,
    pub voting_power: i64,
    pub status: VoterStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Proposal {
    pub id: RowId,
    pub epoch: i32,
    pub hash: ProtocolHash,
    pub initiator_id: AccountId,
    pub first_period: i32,
    pub first_level: Level,
    pub last_level: Level,
    pub upvotes: i32,
    pub voting_power: i64,
}
