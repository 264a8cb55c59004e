pub type AccountId = i64;
pub type Address = String;
pub type Amount = num_bigint::BigInt;
pub type BlockHash = String;
pub type Cycle = i32;
pub type Level = i32;
pub type Mutez = i64;
pub type OpHash = String;
pub type OperationId = i64;
pub type ProtocolHash = String;
pub type RowId = i64;
/// Unix time in milliseconds
pub type Timestamp = i64;

/// Position of the index on the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub level: Level,
    pub hash: BlockHash,
}

impl Head {
    pub fn new(level: Level, hash: BlockHash) -> Self {
        Self { level, hash }
    }

    /// A head representing blank state, before inclusion of any block.
    pub fn initial() -> Self {
        Self {
            level: -1,
            hash: String::from(""),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.level == -1 && self.hash.is_empty()
    }
}

/// Protocol constants driving boundary snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConstants {
    pub blocks_per_cycle: i32,
    pub cycles_per_voting_period: i32,
    /// Minimal staking balance for a delegate to be part of a snapshot.
    pub min_baker_stake: i64,
    /// Participation quorum, in hundredths of a percent.
    pub ballot_quorum: i32,
    /// Share of yay votes needed, in hundredths of a percent.
    pub supermajority: i32,
    /// Share of voting power a proposal needs to enter exploration, in hundredths of a percent.
    pub proposal_quorum: i32,
}

impl ChainConstants {
    pub fn voting_period_length(&self) -> i32 {
        self.blocks_per_cycle * self.cycles_per_voting_period
    }

    /// Cycle a given level belongs to.
    pub fn cycle_of(&self, level: Level) -> Cycle {
        level.div_euclid(self.blocks_per_cycle)
    }

    pub fn is_cycle_start(&self, level: Level) -> bool {
        level.rem_euclid(self.blocks_per_cycle) == 0
    }

    /// Index of the voting period a given level belongs to.
    pub fn voting_period_of(&self, level: Level) -> i32 {
        level.div_euclid(self.voting_period_length())
    }

    pub fn is_voting_period_start(&self, level: Level) -> bool {
        level.rem_euclid(self.voting_period_length()) == 0
    }
}

impl Default for ChainConstants {
    fn default() -> Self {
        Self {
            blocks_per_cycle: 16384,
            cycles_per_voting_period: 5,
            min_baker_stake: 6_000_000_000,
            ballot_quorum: 4200,
            supermajority: 8000,
            proposal_quorum: 500,
        }
    }
}

#[cfg(feature = "test-utilities")]
pub mod testutils {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    use super::BlockHash;

    /// Random base58-looking block hash.
    pub fn random_hash() -> BlockHash {
        let tail: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(49)
            .map(char::from)
            .collect();
        format!("B{tail}")
    }
}
