//! Keeps the index on the main chain.
//!
//! The coordinator pulls blocks one level at a time and hands them to the
//! engine. When the chain it follows no longer extends the indexed head, it
//! walks back until local and remote hashes agree, rolls the index back to
//! that common ancestor and resumes from there.
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tokio::time::Duration;

use super::messages::TrackingMessage;
use super::source::ChainSource;
use super::source::SourceError;
use crate::constants::ROLLBACK_HORIZON;
use crate::core::decoding::DecodeError;
use crate::core::types::Head;
use crate::core::types::Level;
use crate::engine::Engine;
use crate::engine::MutationError;
use crate::monitor::MonitorMessage;
use crate::schema::DecodedBlock;
use crate::store::Store;

/// The capacity of mpsc channels used to communicate tracking events
const CHANNEL_CAPACITY: usize = 8;

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("no common ancestor within {lookback} levels below {head}")]
    NoCommonAncestor { head: Level, lookback: Level },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("engine task aborted: {0}")]
    Task(#[from] JoinError),
    #[error("coordinator is idle")]
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Extending the indexed head one block at a time
    Following,
    /// Looking for the common ancestor of the index and the main chain
    Reconciling,
    /// Stopped after a fatal error
    Idle,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Following => write!(f, "following"),
            Self::Reconciling => write!(f, "reconciling"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

/// Outcome of a single coordinator step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// A block got applied, making it the new head.
    Included(Head),
    /// The index got rolled back to a common ancestor.
    RolledBack(Head),
    /// The next block does not extend the head.
    ForkDetected(Level),
    /// Nothing new on the chain, or the chain source is unavailable.
    Waiting,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Number of levels searched for a common ancestor
    pub lookback: Level,
    /// Level to start indexing from when the index is empty
    pub start_level: Level,
    /// Retries of a mutation failing with a transient error
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub polling_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lookback: ROLLBACK_HORIZON,
            start_level: 0,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            polling_interval: Duration::from_millis(5000),
        }
    }
}

/// Mutations handed over to the engine task.
enum Mutation {
    Apply(Arc<DecodedBlock>),
    Rollback(Level),
}

pub struct Coordinator<S: Store, C: ChainSource> {
    engine: Arc<Mutex<Engine<S>>>,
    source: C,
    settings: Settings,
    state: State,
    /// Last committed head
    head: Head,
    txs: Vec<mpsc::Sender<TrackingMessage>>,
    monitor_tx: Option<mpsc::Sender<MonitorMessage>>,
}

impl<S: Store, C: ChainSource> Coordinator<S, C> {
    pub fn new(engine: Engine<S>, source: C, settings: Settings) -> Self {
        let head = engine.head();
        Self {
            engine: Arc::new(Mutex::new(engine)),
            source,
            settings,
            state: State::Following,
            head,
            txs: vec![],
            monitor_tx: None,
        }
    }

    pub fn with_monitor(mut self, monitor_tx: mpsc::Sender<MonitorMessage>) -> Self {
        self.monitor_tx = Some(monitor_tx);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    /// Shared handle to the engine, for readers.
    pub fn engine(&self) -> Arc<Mutex<Engine<S>>> {
        self.engine.clone()
    }

    /// Returns a channel receiving committed chain events.
    pub fn subscribe(&mut self) -> mpsc::Receiver<TrackingMessage> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.txs.push(tx);
        rx
    }

    /// Keeps stepping until a fatal error.
    pub async fn run(&mut self) -> TrackingError {
        tracing::info!("starting coordinator at {:?}", self.head);
        loop {
            match self.step().await {
                Ok(Progress::Waiting) => tokio::time::sleep(self.settings.polling_interval).await,
                Ok(_) => (),
                Err(TrackingError::Mutation(e)) if self.state != State::Idle => {
                    tracing::warn!("{e}, pausing");
                    tokio::time::sleep(self.settings.polling_interval).await;
                }
                Err(e) => return e,
            }
        }
    }

    /// Makes one move towards the main chain head.
    pub async fn step(&mut self) -> Result<Progress, TrackingError> {
        match self.state {
            State::Following => self.follow().await,
            State::Reconciling => self.reconcile().await,
            State::Idle => Err(TrackingError::Idle),
        }
    }

    async fn follow(&mut self) -> Result<Progress, TrackingError> {
        let next = match self.head.is_initial() {
            true => self.settings.start_level,
            false => self.head.level + 1,
        };
        let remote_level = match self.source.head_level().await {
            Ok(level) => level,
            Err(e) => return self.unavailable(e).await,
        };
        if remote_level < next {
            return self.check_head(remote_level).await;
        }
        let block = match self.source.fetch_block(next).await {
            Ok(block) => block,
            Err(e) => return self.unavailable(e).await,
        };
        if block.level != next {
            return self
                .halt(TrackingError::Decode(DecodeError::UnexpectedLevel {
                    requested: next,
                    got: block.level,
                }))
                .await;
        }
        if !self.head.is_initial() && block.predecessor != self.head.hash {
            tracing::warn!(
                "block {} at level {next} does not extend head {}",
                block.hash,
                self.head.hash
            );
            self.set_state(State::Reconciling).await;
            return Ok(Progress::ForkDetected(next));
        }

        let block = Arc::new(block);
        self.head = self.mutate(Mutation::Apply(block.clone())).await?;
        tracing::info!("included block {} at level {}", block.hash, block.level);
        self.broadcast(TrackingMessage::Include(block)).await;
        self.report_head().await;
        Ok(Progress::Included(self.head.clone()))
    }

    /// Detects a head replaced by a block at the same level while no new
    /// block is available.
    async fn check_head(&mut self, remote_level: Level) -> Result<Progress, TrackingError> {
        if self.head.is_initial() || remote_level < self.head.level {
            return Ok(Progress::Waiting);
        }
        match self.source.block_hash(self.head.level).await {
            Ok(Some(hash)) if hash != self.head.hash => {
                tracing::warn!(
                    "head {} at level {} replaced by {hash}",
                    self.head.hash,
                    self.head.level
                );
                self.set_state(State::Reconciling).await;
                Ok(Progress::ForkDetected(self.head.level))
            }
            Ok(_) => Ok(Progress::Waiting),
            Err(e) => self.unavailable(e).await,
        }
    }

    /// Rolls the index back to the highest level whose hash agrees with the
    /// chain source.
    async fn reconcile(&mut self) -> Result<Progress, TrackingError> {
        let lowest = self.head.level - self.settings.lookback + 1;
        let mut ancestor = None;
        for level in (lowest.max(0)..=self.head.level).rev() {
            let local = self.engine.lock().await.block_hash(level).await?;
            let Some(local) = local else {
                // Below the first indexed block
                break;
            };
            let remote = match self.source.block_hash(level).await {
                Ok(remote) => remote,
                Err(e) => return self.unavailable(e).await,
            };
            if remote.as_ref() == Some(&local) {
                ancestor = Some(level);
                break;
            }
        }
        let Some(ancestor) = ancestor else {
            return self
                .halt(TrackingError::NoCommonAncestor {
                    head: self.head.level,
                    lookback: self.settings.lookback,
                })
                .await;
        };

        let from = self.head.level;
        tracing::info!("rolling back from level {from} to common ancestor {ancestor}");
        let rolled_back = self.mutate(Mutation::Rollback(ancestor)).await;
        if let Ok(head) = &rolled_back {
            self.head = head.clone();
        }
        // Levels committed before a failure are gone as well
        for level in (self.head.level + 1..=from).rev() {
            self.broadcast(TrackingMessage::Rollback(level)).await;
        }
        if self.head.level < from {
            self.report_head().await;
        }
        rolled_back?;
        self.set_state(State::Following).await;
        Ok(Progress::RolledBack(self.head.clone()))
    }

    /// Runs a mutation in its own task, retrying transient failures.
    ///
    /// The engine task runs to completion even if this future gets dropped.
    /// On failure, the head is reset to the engine's, since a rollback
    /// spanning several levels commits them one by one.
    async fn mutate(&mut self, mutation: Mutation) -> Result<Head, TrackingError> {
        let mutation = Arc::new(mutation);
        let mut attempt = 0;
        loop {
            let engine = self.engine.clone();
            let task = tokio::spawn(run_mutation(engine, mutation.clone()));
            let err = match task.await {
                Ok(Ok(head)) => return Ok(head),
                Ok(Err(e)) => e,
                Err(e) => {
                    self.sync_head().await;
                    return self.halt(TrackingError::Task(e)).await;
                }
            };
            self.sync_head().await;
            if !err.is_transient() {
                return self.halt(TrackingError::Mutation(err)).await;
            }
            if attempt >= self.settings.max_retries {
                tracing::warn!("giving up after {attempt} retries: {err}");
                return Err(TrackingError::Mutation(err));
            }
            attempt += 1;
            tracing::warn!("{err}, retrying ({attempt}/{})", self.settings.max_retries);
            tokio::time::sleep(self.settings.retry_delay).await;
        }
    }

    async fn sync_head(&mut self) {
        self.head = self.engine.lock().await.head();
    }

    async fn unavailable(&mut self, e: SourceError) -> Result<Progress, TrackingError> {
        match e {
            SourceError::Node(e) => {
                tracing::warn!("{e}");
                Ok(Progress::Waiting)
            }
            SourceError::Decode(e) => self.halt(TrackingError::Decode(e)).await,
        }
    }

    /// Stops the coordinator for good.
    async fn halt<T>(&mut self, e: TrackingError) -> Result<T, TrackingError> {
        tracing::error!("coordinator stopping: {e}");
        self.set_state(State::Idle).await;
        Err(e)
    }

    async fn set_state(&mut self, state: State) {
        self.state = state;
        if let Some(tx) = &self.monitor_tx {
            let _ = tx.send(MonitorMessage::State(state)).await;
        }
    }

    async fn report_head(&self) {
        if let Some(tx) = &self.monitor_tx {
            let _ = tx.send(MonitorMessage::Head(self.head.level)).await;
        }
    }

    /// Sends a message to all subscribers, forgetting closed channels.
    async fn broadcast(&mut self, msg: TrackingMessage) {
        let mut open = Vec::with_capacity(self.txs.len());
        for tx in self.txs.drain(..) {
            if tx.send(msg.clone()).await.is_ok() {
                open.push(tx);
            }
        }
        self.txs = open;
    }
}

async fn run_mutation<S: Store>(
    engine: Arc<Mutex<Engine<S>>>,
    mutation: Arc<Mutation>,
) -> Result<Head, MutationError> {
    let mut engine = engine.lock().await;
    match mutation.as_ref() {
        Mutation::Apply(block) => engine.apply_block(block).await?,
        Mutation::Rollback(level) => engine.rollback_to(*level).await?,
    }
    Ok(engine.head())
}
