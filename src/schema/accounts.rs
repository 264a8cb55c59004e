use postgres_types::FromSql;
use postgres_types::ToSql;
use serde::Deserialize;
use serde::Serialize;

use super::app_state::OpsCounts;
use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::Level;
use crate::core::types::Mutez;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "account_kind")]
pub enum AccountKind {
    #[postgres(name = "user")]
    User,
    #[postgres(name = "delegate")]
    Delegate,
    #[postgres(name = "contract")]
    Contract,
    #[postgres(name = "smart_rollup")]
    SmartRollup,
    #[postgres(name = "rollup")]
    Rollup,
    #[postgres(name = "ghost")]
    Ghost,
}

/// Kind specific account data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Profile {
    User {
        revealed: bool,
        activated: bool,
    },
    Delegate {
        revealed: bool,
        activated: bool,
        activation_level: Level,
    },
    Contract {
        creator_id: Option<AccountId>,
    },
    SmartRollup {
        creator_id: Option<AccountId>,
        pvm_kind: String,
        genesis_commitment: String,
    },
    Rollup,
    /// Address only ever seen as a token or ticket holder.
    Ghost,
}

impl Profile {
    /// Default profile of an account first referenced by `address`.
    pub fn for_address(address: &str) -> Self {
        if address.starts_with("KT1") {
            Self::Contract { creator_id: None }
        } else if address.starts_with("sr1") {
            Self::SmartRollup {
                creator_id: None,
                pvm_kind: String::new(),
                genesis_commitment: String::new(),
            }
        } else if address.starts_with("txr1") {
            Self::Rollup
        } else {
            Self::User {
                revealed: false,
                activated: false,
            }
        }
    }

    pub fn kind(&self) -> AccountKind {
        match self {
            Self::User { .. } => AccountKind::User,
            Self::Delegate { .. } => AccountKind::Delegate,
            Self::Contract { .. } => AccountKind::Contract,
            Self::SmartRollup { .. } => AccountKind::SmartRollup,
            Self::Rollup => AccountKind::Rollup,
            Self::Ghost => AccountKind::Ghost,
        }
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self, Self::Delegate { .. })
    }

    /// Reveal status of implicit accounts, none for other kinds.
    pub fn revealed(&self) -> Option<bool> {
        match self {
            Self::User { revealed, .. } | Self::Delegate { revealed, .. } => Some(*revealed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub address: Address,
    pub first_level: Level,
    pub last_level: Level,
    /// Full balance, staked, unstaked and bonded funds included.
    pub balance: Mutez,
    pub staked_balance: Mutez,
    pub unstaked_balance: Mutez,
    pub rollup_bonds: Mutez,
    pub delegate_id: Option<AccountId>,
    /// Sum of the balances of accounts delegating to this one, itself excluded.
    pub delegated_balance: Mutez,
    pub delegators_count: i32,
    pub contracts_count: i32,
    pub smart_rollups_count: i32,
    /// Tickets issued by this account
    pub tickets_count: i32,
    pub active_tickets_count: i32,
    pub ticket_balances_count: i32,
    pub ticket_transfers_count: i32,
    /// Tokens issued by this contract
    pub tokens_count: i32,
    pub active_tokens_count: i32,
    pub token_balances_count: i32,
    pub token_transfers_count: i32,
    pub staking_updates_count: i32,
    pub ops_counts: OpsCounts,
    pub profile: Profile,
}

impl Account {
    /// A never referenced account.
    pub fn new(id: AccountId, address: Address, level: Level, profile: Profile) -> Self {
        Self {
            id,
            address,
            first_level: level,
            last_level: level,
            balance: 0,
            staked_balance: 0,
            unstaked_balance: 0,
            rollup_bonds: 0,
            delegate_id: None,
            delegated_balance: 0,
            delegators_count: 0,
            contracts_count: 0,
            smart_rollups_count: 0,
            tickets_count: 0,
            active_tickets_count: 0,
            ticket_balances_count: 0,
            ticket_transfers_count: 0,
            tokens_count: 0,
            active_tokens_count: 0,
            token_balances_count: 0,
            token_transfers_count: 0,
            staking_updates_count: 0,
            ops_counts: OpsCounts::default(),
            profile,
        }
    }

    pub fn kind(&self) -> AccountKind {
        self.profile.kind()
    }

    /// Balance that is neither staked, unstaked nor bonded.
    pub fn spendable_balance(&self) -> Mutez {
        self.balance - self.staked_balance - self.unstaked_balance - self.rollup_bonds
    }

    /// Own balance plus delegated balances, for delegates.
    pub fn staking_balance(&self) -> Mutez {
        self.balance + self.delegated_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_profile_from_address_prefix() {
        assert_eq!(Profile::for_address("KT1abc").kind(), AccountKind::Contract);
        assert_eq!(Profile::for_address("sr1abc").kind(), AccountKind::SmartRollup);
        assert_eq!(Profile::for_address("txr1abc").kind(), AccountKind::Rollup);
        assert_eq!(Profile::for_address("tz1abc").kind(), AccountKind::User);
        assert_eq!(Profile::for_address("tz4abc").kind(), AccountKind::User);
    }

    #[test]
    fn test_profile_serialization_is_tagged() {
        let profile = Profile::Delegate {
            revealed: true,
            activated: false,
            activation_level: 12,
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["type"], "delegate");
        assert_eq!(serde_json::from_value::<Profile>(json).unwrap(), profile);
    }

    #[test]
    fn test_spendable_balance() {
        let mut acc = Account::new(1, String::from("tz1a"), 0, Profile::Ghost);
        acc.balance = 1000;
        acc.staked_balance = 300;
        acc.unstaked_balance = 100;
        acc.rollup_bonds = 50;
        assert_eq!(acc.spendable_balance(), 550);
    }
}
