use serde::Deserialize;
use serde::Serialize;

use crate::core::types::Cycle;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::ProtocolHash;
use crate::schema::voting::Vote;

/// Endorsement or preendorsement of the previous block by a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    /// Number of consensus slots held by the endorser.
    pub slots: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRevelation {
    pub revealed_level: Level,
    pub nonce: String,
    #[serde(default)]
    pub reward: Mutez,
}

/// Denunciation of a delegate signing two conflicting blocks or (pre)endorsements.
///
/// The sender is the accuser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleSigning<A> {
    pub offender: A,
    pub accused_level: Level,
    /// Slashed from the offender's staked balance
    #[serde(default)]
    pub lost_staked: Mutez,
    /// Slashed from the offender's unstaked balance
    #[serde(default)]
    pub lost_unstaked: Mutez,
    /// Minted for the accuser
    #[serde(default)]
    pub reward: Mutez,
    /// Unstake request the unstaked loss is taken from.
    #[serde(default)]
    pub request_cycle: Option<Cycle>,
}

/// Activation of a fundraiser account, the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub balance: Mutez,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Index of the voting period the ballot is cast in.
    pub period: i32,
    pub proposal: ProtocolHash,
    pub vote: Vote,
    pub voting_power: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalUpvote {
    pub period: i32,
    pub proposal: ProtocolHash,
    pub voting_power: i64,
    /// Sender had already upvoted another proposal in the same period.
    ///
    /// Set when the operation is applied.
    #[serde(default)]
    pub duplicated: bool,
}
