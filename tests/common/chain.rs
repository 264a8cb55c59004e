use serde_json::Value;

use tzindex::core::types::BlockHash;
use tzindex::core::types::Level;
use tzindex::schema::DecodedBlock;
use tzindex::schema::DecodedOperation;

pub const BAKER: &str = "tz1baker";
pub const PROTOCOL: &str = "PtNairobi";

/// Hash of test block at `level` on `branch`.
pub fn hash(level: Level, branch: &str) -> BlockHash {
    format!("BL{level}{branch}")
}

/// A contiguous sequence of test blocks.
#[derive(Debug, Clone)]
pub struct TestChain {
    start: Level,
    /// Suffix of hashes of blocks added from now on
    branch: String,
    blocks: Vec<DecodedBlock>,
}

impl TestChain {
    pub fn new(start: Level) -> Self {
        Self {
            start,
            branch: String::new(),
            blocks: vec![],
        }
    }

    pub fn blocks(&self) -> &[DecodedBlock] {
        &self.blocks
    }

    pub fn head(&self) -> Option<&DecodedBlock> {
        self.blocks.last()
    }

    pub fn block(&self, level: Level) -> &DecodedBlock {
        &self.blocks[(level - self.start) as usize]
    }

    /// Adds a block carrying `ops`.
    pub fn push(&mut self, ops: Vec<Value>) -> DecodedBlock {
        self.push_with(ops, |_| ())
    }

    /// Adds a block carrying `ops`, tweaked by `f`.
    pub fn push_with<F: FnOnce(&mut DecodedBlock)>(&mut self, ops: Vec<Value>, f: F) -> DecodedBlock {
        let (level, predecessor) = match self.blocks.last() {
            Some(b) => (b.level + 1, b.hash.clone()),
            None => (self.start, hash(self.start - 1, "")),
        };
        let mut block = DecodedBlock {
            level,
            hash: hash(level, &self.branch),
            predecessor,
            timestamp: 1_600_000_000_000 + level as i64 * 30_000,
            protocol: String::from(PROTOCOL),
            payload_round: 0,
            proposer: String::from(BAKER),
            producer: None,
            reward: 0,
            bonus: 0,
            operations: ops.into_iter().map(op).collect(),
        };
        f(&mut block);
        self.blocks.push(block.clone());
        block
    }

    /// Adds empty blocks up to `level`.
    pub fn extend_to(&mut self, level: Level) {
        while self.head().map(|b| b.level).unwrap_or(self.start - 1) < level {
            self.push(vec![]);
        }
    }

    /// A copy of the chain below `level`, new blocks marked with `branch`.
    pub fn fork(&self, level: Level, branch: &str) -> Self {
        Self {
            start: self.start,
            branch: branch.to_owned(),
            blocks: self
                .blocks
                .iter()
                .filter(|b| b.level < level)
                .cloned()
                .collect(),
        }
    }
}

pub fn op(value: Value) -> DecodedOperation {
    serde_json::from_value(value).unwrap()
}
