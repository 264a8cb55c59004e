use async_trait::async_trait;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::RwLock;

use tzindex::core::tracking::ChainSource;
use tzindex::core::tracking::SourceError;
use tzindex::core::types::BlockHash;
use tzindex::core::types::Level;
use tzindex::core::NodeError;
use tzindex::schema::DecodedBlock;

use super::chain::TestChain;

/// Chain source serving a test chain that can be swapped at will.
#[derive(Clone)]
pub struct MockChain {
    chain: Arc<RwLock<TestChain>>,
    /// Number of upcoming requests to fail
    outages: Arc<AtomicUsize>,
}

impl MockChain {
    pub fn new(chain: TestChain) -> Self {
        Self {
            chain: Arc::new(RwLock::new(chain)),
            outages: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serves `chain` from now on.
    pub fn switch_to(&self, chain: TestChain) {
        *self.chain.write().unwrap() = chain;
    }

    /// Makes the next `n` requests fail as if the node was down.
    pub fn fail_next(&self, n: usize) {
        self.outages.store(n, Ordering::SeqCst);
    }

    fn check_outage(&self) -> Result<(), SourceError> {
        let pending = self.outages.load(Ordering::SeqCst);
        if pending > 0 {
            self.outages.store(pending - 1, Ordering::SeqCst);
            return Err(SourceError::Node(NodeError::NodeUnreachable));
        }
        Ok(())
    }

    fn block(&self, level: Level) -> Option<DecodedBlock> {
        self.chain
            .read()
            .unwrap()
            .blocks()
            .iter()
            .find(|b| b.level == level)
            .cloned()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn head_level(&self) -> Result<Level, SourceError> {
        self.check_outage()?;
        let chain = self.chain.read().unwrap();
        Ok(chain.head().map(|b| b.level).unwrap_or(-1))
    }

    async fn block_hash(&self, level: Level) -> Result<Option<BlockHash>, SourceError> {
        self.check_outage()?;
        Ok(self.block(level).map(|b| b.hash))
    }

    async fn fetch_block(&self, level: Level) -> Result<DecodedBlock, SourceError> {
        self.check_outage()?;
        self.block(level)
            .ok_or_else(|| SourceError::Node(NodeError::API404Notfound(level.to_string())))
    }
}
