//! Typed records persisted by the indexer, one per table.
mod accounts;
mod app_state;
mod big_maps;
mod blocks;
mod cycles;
pub mod operations;
mod rows;
mod staking;
mod tickets;
mod tokens;
mod voting;

pub use accounts::Account;
pub use accounts::AccountKind;
pub use accounts::Profile;
pub use app_state::AppState;
pub use app_state::Counter;
pub use app_state::OpsCounts;
pub use big_maps::BigMap;
pub use big_maps::BigMapAction;
pub use big_maps::BigMapDiff;
pub use big_maps::BigMapKey;
pub use big_maps::BigMapUpdate;
pub use big_maps::BigMapUpdateCause;
pub use blocks::Block;
pub use blocks::DecodedBlock;
pub use blocks::Protocol;
pub use cycles::BakerCycle;
pub use cycles::Cycle;
pub use cycles::DelegatorCycle;
pub use cycles::SnapshotBalance;
pub use cycles::Statistics;
pub use operations::Content;
pub use operations::DecodedOperation;
pub use operations::Effects;
pub use operations::Envelope;
pub use operations::Operation;
pub use operations::OperationKind;
pub use operations::OperationRecord;
pub use operations::OperationStatus;
pub use rows::Entity;
pub use rows::IndexKey;
pub use rows::Row;
pub use rows::RowKey;
pub use rows::Subject;
pub use rows::Table;
pub use staking::StakingUpdate;
pub use staking::StakingUpdateCause;
pub use staking::StakingUpdateKind;
pub use staking::UnstakeRequest;
pub use tickets::Ticket;
pub use tickets::TicketBalance;
pub use tickets::TicketMovement;
pub use tickets::TicketTransfer;
pub use tickets::TicketTransferCause;
pub use tokens::Token;
pub use tokens::TokenBalance;
pub use tokens::TokenMovement;
pub use tokens::TokenStandard;
pub use tokens::TokenTransfer;
pub use tokens::TokenTransferCause;
pub use voting::PeriodKind;
pub use voting::PeriodStatus;
pub use voting::Proposal;
pub use voting::Vote;
pub use voting::VoterStatus;
pub use voting::VotingPeriod;
pub use voting::VotingSnapshot;

/// (De)serializes unbounded amounts as decimal strings.
///
/// Numbers are accepted on input as well.
pub mod amount_str {
    use num_bigint::BigInt;
    use serde::de::Error;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s
                .parse::<BigInt>()
                .map_err(|e| D::Error::custom(format!("invalid amount `{s}`: {e}"))),
            Repr::Number(n) => Ok(BigInt::from(n)),
        }
    }
}
