//! Operation envelope shared by all kinds, plus tagged per-kind content.
//!
//! Content types are generic over the way accounts are referenced:
//! decoded operations refer to accounts by `Address`, stored ones by `AccountId`.
mod consensus;
mod implicit;
mod manager;
mod rollups;

pub use consensus::Activation;
pub use consensus::Ballot;
pub use consensus::DoubleSigning;
pub use consensus::Endorsement;
pub use consensus::NonceRevelation;
pub use consensus::ProposalUpvote;
pub use implicit::Autostaking;
pub use implicit::AutostakingAction;
pub use implicit::Migration;
pub use implicit::MigrationKind;
pub use implicit::RevelationPenalty;
pub use implicit::Reward;
pub use manager::Delegation;
pub use manager::DrainDelegate;
pub use manager::IncreasePaidStorage;
pub use manager::Origination;
pub use manager::RegisterConstant;
pub use manager::Reveal;
pub use manager::Staking;
pub use manager::StakingAction;
pub use manager::Transaction;
pub use manager::TransferTicket;
pub use manager::UpdateConsensusKey;
pub use rollups::DalPublishCommitment;
pub use rollups::RefutationOutcome;
pub use rollups::SmartRollupAddMessages;
pub use rollups::SmartRollupCement;
pub use rollups::SmartRollupExecute;
pub use rollups::SmartRollupOriginate;
pub use rollups::SmartRollupPublish;
pub use rollups::SmartRollupRecoverBond;
pub use rollups::SmartRollupRefute;

use postgres_types::FromSql;
use postgres_types::ToSql;
use serde::Deserialize;
use serde::Serialize;

use super::big_maps::BigMapDiff;
use super::tickets::TicketMovement;
use super::tokens::TokenMovement;
use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::core::types::OpHash;
use crate::core::types::OperationId;
use crate::core::types::Timestamp;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Endorsement,
    Preendorsement,
    NonceRevelation,
    DoubleBaking,
    DoubleEndorsing,
    DoublePreendorsing,
    Activation,
    Ballot,
    Proposal,
    EndorsingReward,
    RevelationPenalty,
    Migration,
    Autostaking,
    DalAttestationReward,
    Reveal,
    Transaction,
    Delegation,
    Origination,
    RegisterConstant,
    IncreasePaidStorage,
    TransferTicket,
    UpdateConsensusKey,
    DrainDelegate,
    Staking,
    SmartRollupOriginate,
    SmartRollupAddMessages,
    SmartRollupPublish,
    SmartRollupCement,
    SmartRollupExecute,
    SmartRollupRefute,
    SmartRollupRecoverBond,
    DalPublishCommitment,
}

impl OperationKind {
    pub const ALL: [OperationKind; 32] = [
        Self::Endorsement,
        Self::Preendorsement,
        Self::NonceRevelation,
        Self::DoubleBaking,
        Self::DoubleEndorsing,
        Self::DoublePreendorsing,
        Self::Activation,
        Self::Ballot,
        Self::Proposal,
        Self::EndorsingReward,
        Self::RevelationPenalty,
        Self::Migration,
        Self::Autostaking,
        Self::DalAttestationReward,
        Self::Reveal,
        Self::Transaction,
        Self::Delegation,
        Self::Origination,
        Self::RegisterConstant,
        Self::IncreasePaidStorage,
        Self::TransferTicket,
        Self::UpdateConsensusKey,
        Self::DrainDelegate,
        Self::Staking,
        Self::SmartRollupOriginate,
        Self::SmartRollupAddMessages,
        Self::SmartRollupPublish,
        Self::SmartRollupCement,
        Self::SmartRollupExecute,
        Self::SmartRollupRefute,
        Self::SmartRollupRecoverBond,
        Self::DalPublishCommitment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Endorsement => "endorsement",
            Self::Preendorsement => "preendorsement",
            Self::NonceRevelation => "nonce_revelation",
            Self::DoubleBaking => "double_baking",
            Self::DoubleEndorsing => "double_endorsing",
            Self::DoublePreendorsing => "double_preendorsing",
            Self::Activation => "activation",
            Self::Ballot => "ballot",
            Self::Proposal => "proposal",
            Self::EndorsingReward => "endorsing_reward",
            Self::RevelationPenalty => "revelation_penalty",
            Self::Migration => "migration",
            Self::Autostaking => "autostaking",
            Self::DalAttestationReward => "dal_attestation_reward",
            Self::Reveal => "reveal",
            Self::Transaction => "transaction",
            Self::Delegation => "delegation",
            Self::Origination => "origination",
            Self::RegisterConstant => "register_constant",
            Self::IncreasePaidStorage => "increase_paid_storage",
            Self::TransferTicket => "transfer_ticket",
            Self::UpdateConsensusKey => "update_consensus_key",
            Self::DrainDelegate => "drain_delegate",
            Self::Staking => "staking",
            Self::SmartRollupOriginate => "smart_rollup_originate",
            Self::SmartRollupAddMessages => "smart_rollup_add_messages",
            Self::SmartRollupPublish => "smart_rollup_publish",
            Self::SmartRollupCement => "smart_rollup_cement",
            Self::SmartRollupExecute => "smart_rollup_execute",
            Self::SmartRollupRefute => "smart_rollup_refute",
            Self::SmartRollupRecoverBond => "smart_rollup_recover_bond",
            Self::DalPublishCommitment => "dal_publish_commitment",
        }
    }

    /// Name of the table holding operations of this kind.
    pub fn table_name(&self) -> String {
        format!("{}_ops", self.as_str())
    }

    /// Manager operations are signed by their sender and pay fees.
    pub fn is_manager(&self) -> bool {
        matches!(
            self,
            Self::Reveal
                | Self::Transaction
                | Self::Delegation
                | Self::Origination
                | Self::RegisterConstant
                | Self::IncreasePaidStorage
                | Self::TransferTicket
                | Self::UpdateConsensusKey
                | Self::DrainDelegate
                | Self::Staking
                | Self::SmartRollupOriginate
                | Self::SmartRollupAddMessages
                | Self::SmartRollupPublish
                | Self::SmartRollupCement
                | Self::SmartRollupExecute
                | Self::SmartRollupRefute
                | Self::SmartRollupRecoverBond
                | Self::DalPublishCommitment
        )
    }

    /// Operations produced by the protocol itself rather than included in a block.
    pub fn is_implicit(&self) -> bool {
        matches!(
            self,
            Self::EndorsingReward
                | Self::RevelationPenalty
                | Self::Migration
                | Self::Autostaking
                | Self::DalAttestationReward
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown operation kind: {s}"))
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql,
)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "operation_status")]
pub enum OperationStatus {
    #[default]
    #[postgres(name = "applied")]
    Applied,
    #[postgres(name = "failed")]
    Failed,
    #[postgres(name = "backtracked")]
    Backtracked,
    #[postgres(name = "skipped")]
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    /// Paid to the block producer
    #[serde(default)]
    pub baker_fee: Mutez,
    /// Burned for used storage
    #[serde(default)]
    pub storage_fee: Mutez,
    /// Burned for newly allocated accounts
    #[serde(default)]
    pub allocation_fee: Mutez,
}

impl Fees {
    pub fn burned(&self) -> Mutez {
        self.storage_fee + self.allocation_fee
    }

    pub fn total(&self) -> Mutez {
        self.baker_fee + self.burned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub gas_limit: i64,
    #[serde(default)]
    pub gas_used: i64,
    #[serde(default)]
    pub storage_limit: i64,
    #[serde(default)]
    pub storage_used: i64,
}

/// Fields shared by operations of every kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<A> {
    #[serde(default)]
    pub hash: Option<OpHash>,
    /// Account the operation is attributed to: the signer of manager and consensus
    /// operations, the affected account for implicit ones.
    pub sender: A,
    /// Sender of the external operation an internal one was emitted from.
    #[serde(default = "Option::default")]
    pub initiator: Option<A>,
    #[serde(default)]
    pub nonce: Option<i32>,
    #[serde(default)]
    pub counter: Option<i64>,
    #[serde(default)]
    pub fees: Fees,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub status: OperationStatus,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content<A> {
    Endorsement(Endorsement),
    Preendorsement(Endorsement),
    NonceRevelation(NonceRevelation),
    DoubleBaking(DoubleSigning<A>),
    DoubleEndorsing(DoubleSigning<A>),
    DoublePreendorsing(DoubleSigning<A>),
    Activation(Activation),
    Ballot(Ballot),
    Proposal(ProposalUpvote),
    EndorsingReward(Reward),
    RevelationPenalty(RevelationPenalty),
    Migration(Migration),
    Autostaking(Autostaking),
    DalAttestationReward(Reward),
    Reveal(Reveal),
    Transaction(Transaction<A>),
    Delegation(Delegation<A>),
    Origination(Origination<A>),
    RegisterConstant(RegisterConstant),
    IncreasePaidStorage(IncreasePaidStorage<A>),
    TransferTicket(TransferTicket<A>),
    UpdateConsensusKey(UpdateConsensusKey),
    DrainDelegate(DrainDelegate<A>),
    Staking(Staking<A>),
    SmartRollupOriginate(SmartRollupOriginate<A>),
    SmartRollupAddMessages(SmartRollupAddMessages),
    SmartRollupPublish(SmartRollupPublish<A>),
    SmartRollupCement(SmartRollupCement<A>),
    SmartRollupExecute(SmartRollupExecute<A>),
    SmartRollupRefute(SmartRollupRefute<A>),
    SmartRollupRecoverBond(SmartRollupRecoverBond<A>),
    DalPublishCommitment(DalPublishCommitment),
}

impl<A> Content<A> {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Endorsement(_) => OperationKind::Endorsement,
            Self::Preendorsement(_) => OperationKind::Preendorsement,
            Self::NonceRevelation(_) => OperationKind::NonceRevelation,
            Self::DoubleBaking(_) => OperationKind::DoubleBaking,
            Self::DoubleEndorsing(_) => OperationKind::DoubleEndorsing,
            Self::DoublePreendorsing(_) => OperationKind::DoublePreendorsing,
            Self::Activation(_) => OperationKind::Activation,
            Self::Ballot(_) => OperationKind::Ballot,
            Self::Proposal(_) => OperationKind::Proposal,
            Self::EndorsingReward(_) => OperationKind::EndorsingReward,
            Self::RevelationPenalty(_) => OperationKind::RevelationPenalty,
            Self::Migration(_) => OperationKind::Migration,
            Self::Autostaking(_) => OperationKind::Autostaking,
            Self::DalAttestationReward(_) => OperationKind::DalAttestationReward,
            Self::Reveal(_) => OperationKind::Reveal,
            Self::Transaction(_) => OperationKind::Transaction,
            Self::Delegation(_) => OperationKind::Delegation,
            Self::Origination(_) => OperationKind::Origination,
            Self::RegisterConstant(_) => OperationKind::RegisterConstant,
            Self::IncreasePaidStorage(_) => OperationKind::IncreasePaidStorage,
            Self::TransferTicket(_) => OperationKind::TransferTicket,
            Self::UpdateConsensusKey(_) => OperationKind::UpdateConsensusKey,
            Self::DrainDelegate(_) => OperationKind::DrainDelegate,
            Self::Staking(_) => OperationKind::Staking,
            Self::SmartRollupOriginate(_) => OperationKind::SmartRollupOriginate,
            Self::SmartRollupAddMessages(_) => OperationKind::SmartRollupAddMessages,
            Self::SmartRollupPublish(_) => OperationKind::SmartRollupPublish,
            Self::SmartRollupCement(_) => OperationKind::SmartRollupCement,
            Self::SmartRollupExecute(_) => OperationKind::SmartRollupExecute,
            Self::SmartRollupRefute(_) => OperationKind::SmartRollupRefute,
            Self::SmartRollupRecoverBond(_) => OperationKind::SmartRollupRecoverBond,
            Self::DalPublishCommitment(_) => OperationKind::DalPublishCommitment,
        }
    }
}

impl<A: Clone> Content<A> {
    /// Accounts referenced by the content, in field order.
    pub fn referenced_accounts(&self) -> Vec<A> {
        match self {
            Self::DoubleBaking(c) | Self::DoubleEndorsing(c) | Self::DoublePreendorsing(c) => {
                vec![c.offender.clone()]
            }
            Self::Transaction(c) => vec![c.target.clone()],
            Self::Delegation(c) => c.delegate.iter().chain(&c.prev_delegate).cloned().collect(),
            Self::Origination(c) => c.contract.iter().chain(&c.delegate).cloned().collect(),
            Self::IncreasePaidStorage(c) => vec![c.contract.clone()],
            Self::TransferTicket(c) => vec![c.target.clone(), c.ticketer.clone()],
            Self::DrainDelegate(c) => vec![c.target.clone()],
            Self::Staking(c) => c.baker.iter().cloned().collect(),
            Self::SmartRollupOriginate(c) => c.rollup.iter().cloned().collect(),
            Self::SmartRollupPublish(c) => vec![c.rollup.clone()],
            Self::SmartRollupCement(c) => vec![c.rollup.clone()],
            Self::SmartRollupExecute(c) => vec![c.rollup.clone()],
            Self::SmartRollupRefute(c) => {
                let mut refs = vec![c.rollup.clone(), c.opponent.clone()];
                if let Some(outcome) = &c.outcome {
                    refs.push(outcome.loser.clone());
                    refs.push(outcome.winner.clone());
                }
                refs
            }
            Self::SmartRollupRecoverBond(c) => vec![c.rollup.clone(), c.staker.clone()],
            _ => vec![],
        }
    }

    /// Converts account references, failing on the first one `f` rejects.
    pub fn try_map<B, E, F>(&self, mut f: F) -> Result<Content<B>, E>
    where
        F: FnMut(&A) -> Result<B, E>,
    {
        Ok(match self {
            Self::Endorsement(c) => Content::Endorsement(c.clone()),
            Self::Preendorsement(c) => Content::Preendorsement(c.clone()),
            Self::NonceRevelation(c) => Content::NonceRevelation(c.clone()),
            Self::DoubleBaking(c) => Content::DoubleBaking(double_signing(c, &mut f)?),
            Self::DoubleEndorsing(c) => Content::DoubleEndorsing(double_signing(c, &mut f)?),
            Self::DoublePreendorsing(c) => Content::DoublePreendorsing(double_signing(c, &mut f)?),
            Self::Activation(c) => Content::Activation(c.clone()),
            Self::Ballot(c) => Content::Ballot(c.clone()),
            Self::Proposal(c) => Content::Proposal(c.clone()),
            Self::EndorsingReward(c) => Content::EndorsingReward(c.clone()),
            Self::RevelationPenalty(c) => Content::RevelationPenalty(c.clone()),
            Self::Migration(c) => Content::Migration(c.clone()),
            Self::Autostaking(c) => Content::Autostaking(c.clone()),
            Self::DalAttestationReward(c) => Content::DalAttestationReward(c.clone()),
            Self::Reveal(c) => Content::Reveal(c.clone()),
            Self::Transaction(c) => Content::Transaction(Transaction {
                target: f(&c.target)?,
                amount: c.amount,
                entrypoint: c.entrypoint.clone(),
                parameters: c.parameters.clone(),
            }),
            Self::Delegation(c) => Content::Delegation(Delegation {
                delegate: map_opt(&c.delegate, &mut f)?,
                prev_delegate: map_opt(&c.prev_delegate, &mut f)?,
                amount: c.amount,
                registration: c.registration,
            }),
            Self::Origination(c) => Content::Origination(Origination {
                contract: map_opt(&c.contract, &mut f)?,
                delegate: map_opt(&c.delegate, &mut f)?,
                balance: c.balance,
                script: c.script.clone(),
            }),
            Self::RegisterConstant(c) => Content::RegisterConstant(c.clone()),
            Self::IncreasePaidStorage(c) => Content::IncreasePaidStorage(IncreasePaidStorage {
                contract: f(&c.contract)?,
                amount: c.amount,
            }),
            Self::TransferTicket(c) => Content::TransferTicket(TransferTicket {
                target: f(&c.target)?,
                ticketer: f(&c.ticketer)?,
                amount: c.amount.clone(),
                entrypoint: c.entrypoint.clone(),
                content: c.content.clone(),
            }),
            Self::UpdateConsensusKey(c) => Content::UpdateConsensusKey(c.clone()),
            Self::DrainDelegate(c) => Content::DrainDelegate(DrainDelegate {
                target: f(&c.target)?,
                amount: c.amount,
                fee: c.fee,
            }),
            Self::Staking(c) => Content::Staking(Staking {
                action: c.action,
                amount: c.amount,
                request_cycle: c.request_cycle,
                baker: map_opt(&c.baker, &mut f)?,
            }),
            Self::SmartRollupOriginate(c) => Content::SmartRollupOriginate(SmartRollupOriginate {
                rollup: map_opt(&c.rollup, &mut f)?,
                pvm_kind: c.pvm_kind.clone(),
                genesis_commitment: c.genesis_commitment.clone(),
            }),
            Self::SmartRollupAddMessages(c) => Content::SmartRollupAddMessages(c.clone()),
            Self::SmartRollupPublish(c) => Content::SmartRollupPublish(SmartRollupPublish {
                rollup: f(&c.rollup)?,
                commitment: c.commitment.clone(),
                bond: c.bond,
            }),
            Self::SmartRollupCement(c) => Content::SmartRollupCement(SmartRollupCement {
                rollup: f(&c.rollup)?,
                commitment: c.commitment.clone(),
            }),
            Self::SmartRollupExecute(c) => Content::SmartRollupExecute(SmartRollupExecute {
                rollup: f(&c.rollup)?,
                commitment: c.commitment.clone(),
            }),
            Self::SmartRollupRefute(c) => Content::SmartRollupRefute(SmartRollupRefute {
                rollup: f(&c.rollup)?,
                opponent: f(&c.opponent)?,
                outcome: match &c.outcome {
                    Some(o) => Some(RefutationOutcome {
                        winner: f(&o.winner)?,
                        loser: f(&o.loser)?,
                        loss: o.loss,
                        reward: o.reward,
                    }),
                    None => None,
                },
            }),
            Self::SmartRollupRecoverBond(c) => {
                Content::SmartRollupRecoverBond(SmartRollupRecoverBond {
                    rollup: f(&c.rollup)?,
                    staker: f(&c.staker)?,
                    bond: c.bond,
                })
            }
            Self::DalPublishCommitment(c) => Content::DalPublishCommitment(c.clone()),
        })
    }
}

fn map_opt<A, B, E>(
    a: &Option<A>,
    f: &mut impl FnMut(&A) -> Result<B, E>,
) -> Result<Option<B>, E> {
    a.as_ref().map(f).transpose()
}

fn double_signing<A, B, E>(
    c: &DoubleSigning<A>,
    f: &mut impl FnMut(&A) -> Result<B, E>,
) -> Result<DoubleSigning<B>, E> {
    Ok(DoubleSigning {
        offender: f(&c.offender)?,
        accused_level: c.accused_level,
        lost_staked: c.lost_staked,
        lost_unstaked: c.lost_unstaked,
        reward: c.reward,
        request_cycle: c.request_cycle,
    })
}

/// Side effects reported by the decoder alongside an operation's content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    #[serde(default)]
    pub big_map_diffs: Vec<BigMapDiff>,
    #[serde(default)]
    pub ticket_transfers: Vec<TicketMovement>,
    #[serde(default)]
    pub token_transfers: Vec<TokenMovement>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.big_map_diffs.is_empty()
            && self.ticket_transfers.is_empty()
            && self.token_transfers.is_empty()
    }
}

/// An operation as produced by a protocol decoder, ready to be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedOperation {
    #[serde(flatten)]
    pub envelope: Envelope<Address>,
    pub content: Content<Address>,
    #[serde(default)]
    pub effects: Effects,
}

/// A stored operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: OperationId,
    pub level: Level,
    pub timestamp: Timestamp,
    pub envelope: Envelope<AccountId>,
    pub content: Content<AccountId>,
    /// Distinct accounts the operation refers to, sorted.
    pub account_ids: Vec<AccountId>,
}

impl Operation {
    pub fn new(
        id: OperationId,
        level: Level,
        timestamp: Timestamp,
        envelope: Envelope<AccountId>,
        content: Content<AccountId>,
    ) -> Self {
        let mut account_ids = vec![envelope.sender];
        account_ids.extend(envelope.initiator);
        account_ids.extend(content.referenced_accounts());
        account_ids.sort_unstable();
        account_ids.dedup();
        Self {
            id,
            level,
            timestamp,
            envelope,
            content,
            account_ids,
        }
    }
}

/// Common accessors over decoded and stored operations.
pub trait OperationRecord {
    type AccountRef;

    fn kind(&self) -> OperationKind;
    fn envelope(&self) -> &Envelope<Self::AccountRef>;

    fn sender(&self) -> &Self::AccountRef {
        &self.envelope().sender
    }

    fn status(&self) -> OperationStatus {
        self.envelope().status
    }

    fn is_applied(&self) -> bool {
        self.status() == OperationStatus::Applied
    }

    fn fees(&self) -> &Fees {
        &self.envelope().fees
    }
}

impl OperationRecord for DecodedOperation {
    type AccountRef = Address;

    fn kind(&self) -> OperationKind {
        self.content.kind()
    }

    fn envelope(&self) -> &Envelope<Address> {
        &self.envelope
    }
}

impl OperationRecord for Operation {
    type AccountRef = AccountId;

    fn kind(&self) -> OperationKind {
        self.content.kind()
    }

    fn envelope(&self) -> &Envelope<AccountId> {
        &self.envelope
    }
}
