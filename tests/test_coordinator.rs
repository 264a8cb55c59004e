mod common;

use pretty_assertions::assert_eq;
use tokio;
use tokio::sync::mpsc;
use tokio::time::Duration;

use common::chain::hash;
use common::chain::TestChain;
use common::chain::BAKER;
use common::constants;
use common::mock_chain::MockChain;
use common::ops;
use tzindex::core::tracking::Coordinator;
use tzindex::core::tracking::Progress;
use tzindex::core::tracking::Settings;
use tzindex::core::tracking::State;
use tzindex::core::tracking::TrackingError;
use tzindex::core::tracking::TrackingMessage;
use tzindex::core::types::Head;
use tzindex::core::types::Level;
use tzindex::engine::Engine;
use tzindex::engine::MutationError;
use tzindex::monitor::MonitorMessage;
use tzindex::store::MemoryStore;

const ALICE: &str = "tz1alice";
const BOB: &str = "tz1bob";
const CAROL: &str = "tz1carol";

fn settings() -> Settings {
    Settings {
        lookback: 20,
        start_level: 100,
        max_retries: 3,
        retry_delay: Duration::from_millis(1),
        polling_interval: Duration::from_millis(1),
    }
}

/// Main chain from level 100 to 105.
fn main_chain() -> TestChain {
    let mut chain = TestChain::new(100);
    chain.push(vec![ops::bootstrap(BAKER, 1000), ops::bootstrap(ALICE, 1000)]);
    chain.extend_to(103);
    chain.push(vec![ops::transaction(ALICE, BOB, 100, 1)]);
    chain.extend_to(105);
    chain
}

/// Branch replacing the main chain from level 103 on.
fn fork(chain: &TestChain) -> TestChain {
    let mut fork = chain.fork(103, "b");
    fork.push(vec![ops::transaction(ALICE, CAROL, 250, 2)]);
    fork.extend_to(105);
    fork
}

async fn coordinator(
    source: MockChain,
    settings: Settings,
) -> (Coordinator<MemoryStore, MockChain>, MemoryStore) {
    let store = MemoryStore::new();
    let engine = Engine::new(store.clone(), constants()).await.unwrap();
    (Coordinator::new(engine, source, settings), store)
}

/// Steps the coordinator until nothing new is left.
async fn catch_up(coordinator: &mut Coordinator<MemoryStore, MockChain>) -> Vec<Progress> {
    let mut steps = vec![];
    loop {
        match coordinator.step().await.unwrap() {
            Progress::Waiting => return steps,
            progress => steps.push(progress),
        }
    }
}

fn drain(rx: &mut mpsc::Receiver<TrackingMessage>) -> Vec<String> {
    let mut events = vec![];
    while let Ok(msg) = rx.try_recv() {
        events.push(match msg {
            TrackingMessage::Include(block) => format!("include {}", block.hash),
            TrackingMessage::Rollback(level) => format!("rollback {level}"),
        });
    }
    events
}

/// Store of an engine applying `chain` from scratch.
async fn replay(chain: &TestChain) -> MemoryStore {
    let store = MemoryStore::new();
    let mut engine = Engine::new(store.clone(), constants()).await.unwrap();
    for block in chain.blocks() {
        engine.apply_block(block).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_follows_main_chain() {
    let chain = main_chain();
    let (mut coordinator, store) = coordinator(MockChain::new(chain.clone()), settings()).await;
    let mut rx = coordinator.subscribe();

    let steps = catch_up(&mut coordinator).await;
    let expected: Vec<Progress> = (100..=105)
        .map(|level| Progress::Included(Head::new(level, hash(level, ""))))
        .collect();
    assert_eq!(steps, expected);
    assert_eq!(coordinator.state(), State::Following);
    assert_eq!(coordinator.head(), &Head::new(105, hash(105, "")));

    let expected: Vec<String> = (100..=105)
        .map(|level| format!("include {}", hash(level, "")))
        .collect();
    assert_eq!(drain(&mut rx), expected);
    assert_eq!(*store.snapshot(), *replay(&chain).await.snapshot());
}

#[tokio::test]
async fn test_starts_from_indexed_head() {
    let chain = main_chain();
    let store = MemoryStore::new();
    let mut engine = Engine::new(store.clone(), constants()).await.unwrap();
    for level in 100..=102 {
        engine.apply_block(chain.block(level)).await.unwrap();
    }
    let engine = Engine::new(store.clone(), constants()).await.unwrap();
    let mut coordinator = Coordinator::new(engine, MockChain::new(chain), settings());
    assert_eq!(
        coordinator.step().await.unwrap(),
        Progress::Included(Head::new(103, hash(103, "")))
    );
}

#[tokio::test]
async fn test_replaced_head_is_rolled_back() {
    let chain = main_chain();
    let source = MockChain::new(chain.clone());
    let (mut coordinator, store) = coordinator(source.clone(), settings()).await;
    catch_up(&mut coordinator).await;
    let mut rx = coordinator.subscribe();

    // Competing branch of same height
    let fork = fork(&chain);
    source.switch_to(fork.clone());
    assert_eq!(coordinator.step().await.unwrap(), Progress::ForkDetected(105));
    assert_eq!(coordinator.state(), State::Reconciling);

    let common = Head::new(102, hash(102, ""));
    assert_eq!(
        coordinator.step().await.unwrap(),
        Progress::RolledBack(common.clone())
    );
    assert_eq!(coordinator.state(), State::Following);
    assert_eq!(coordinator.head(), &common);
    assert_eq!(*store.snapshot(), *replay(&chain.fork(103, "")).await.snapshot());

    let steps = catch_up(&mut coordinator).await;
    assert_eq!(steps.len(), 3);
    assert_eq!(coordinator.head(), &Head::new(105, hash(105, "b")));
    assert_eq!(
        drain(&mut rx),
        vec![
            String::from("rollback 105"),
            String::from("rollback 104"),
            String::from("rollback 103"),
            format!("include {}", hash(103, "b")),
            format!("include {}", hash(104, "b")),
            format!("include {}", hash(105, "b")),
        ]
    );
    assert_eq!(*store.snapshot(), *replay(&fork).await.snapshot());
}

#[tokio::test]
async fn test_interrupted_rollback_resumes_from_engine_head() {
    let chain = main_chain();
    let source = MockChain::new(chain.clone());
    let settings = Settings {
        max_retries: 1,
        ..settings()
    };
    let (mut coordinator, store) = coordinator(source.clone(), settings).await;
    let (monitor_tx, mut monitor_rx) = mpsc::channel(100);
    coordinator = coordinator.with_monitor(monitor_tx);
    catch_up(&mut coordinator).await;
    let mut rx = coordinator.subscribe();

    let fork = fork(&chain);
    source.switch_to(fork.clone());
    assert_eq!(coordinator.step().await.unwrap(), Progress::ForkDetected(105));

    // Level 105 goes, the store fails from level 104 on
    store.fail_commits_after(1);
    match coordinator.step().await {
        Err(TrackingError::Mutation(e)) => assert!(e.is_transient()),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(coordinator.state(), State::Reconciling);
    assert_eq!(coordinator.head(), &Head::new(104, hash(104, "")));
    assert_eq!(drain(&mut rx), vec![String::from("rollback 105")]);
    let mut heads = vec![];
    while let Ok(msg) = monitor_rx.try_recv() {
        if let MonitorMessage::Head(level) = msg {
            heads.push(level);
        }
    }
    assert_eq!(heads.last(), Some(&104));

    store.heal();
    assert_eq!(
        coordinator.step().await.unwrap(),
        Progress::RolledBack(Head::new(102, hash(102, "")))
    );
    assert_eq!(coordinator.state(), State::Following);
    assert_eq!(
        drain(&mut rx),
        vec![String::from("rollback 104"), String::from("rollback 103")]
    );
    catch_up(&mut coordinator).await;
    assert_eq!(*store.snapshot(), *replay(&fork).await.snapshot());
}

#[tokio::test]
async fn test_block_not_extending_head_triggers_reorg() {
    let chain = main_chain();
    let source = MockChain::new(chain.fork(104, ""));
    let (mut coordinator, store) = coordinator(source.clone(), settings()).await;
    catch_up(&mut coordinator).await;
    assert_eq!(coordinator.head().level, 103);

    // Longer branch, forking below the head
    let mut fork = fork(&chain);
    fork.extend_to(107);
    source.switch_to(fork.clone());
    assert_eq!(coordinator.step().await.unwrap(), Progress::ForkDetected(104));
    assert_eq!(
        coordinator.step().await.unwrap(),
        Progress::RolledBack(Head::new(102, hash(102, "")))
    );
    let steps = catch_up(&mut coordinator).await;
    assert_eq!(steps.len(), 5);
    assert_eq!(*store.snapshot(), *replay(&fork).await.snapshot());
}

#[tokio::test]
async fn test_no_common_ancestor_stops_coordinator() {
    let chain = main_chain();
    let source = MockChain::new(chain.clone());
    let settings = Settings {
        lookback: 2,
        ..settings()
    };
    let (mut coordinator, store) = coordinator(source.clone(), settings).await;
    let (monitor_tx, mut monitor_rx) = mpsc::channel(100);
    coordinator = coordinator.with_monitor(monitor_tx);
    catch_up(&mut coordinator).await;
    let before = store.snapshot();

    let mut fork = chain.fork(101, "b");
    fork.extend_to(106);
    source.switch_to(fork);
    assert_eq!(coordinator.step().await.unwrap(), Progress::ForkDetected(106));
    let err = coordinator.step().await.unwrap_err();
    assert!(matches!(
        err,
        TrackingError::NoCommonAncestor {
            head: 105,
            lookback: 2
        }
    ));
    assert_eq!(coordinator.state(), State::Idle);
    assert!(matches!(coordinator.step().await, Err(TrackingError::Idle)));
    assert_eq!(*store.snapshot(), *before);

    let mut states = vec![];
    while let Ok(msg) = monitor_rx.try_recv() {
        if let MonitorMessage::State(state) = msg {
            states.push(state);
        }
    }
    assert_eq!(states, vec![State::Reconciling, State::Idle]);
}

#[tokio::test]
async fn test_idle_state_reaches_busy_monitor() {
    let chain = main_chain();
    let source = MockChain::new(chain.clone());
    let settings = Settings {
        lookback: 2,
        ..settings()
    };
    let (coordinator, _store) = coordinator(source.clone(), settings).await;
    // Single slot queue with a slow reader, full most of the time
    let (monitor_tx, mut monitor_rx) = mpsc::channel(1);
    let reader = tokio::spawn(async move {
        let mut states = vec![];
        while let Some(msg) = monitor_rx.recv().await {
            if let MonitorMessage::State(state) = msg {
                states.push(state);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        states
    });
    let mut coordinator = coordinator.with_monitor(monitor_tx);
    catch_up(&mut coordinator).await;

    let mut fork = chain.fork(101, "b");
    fork.extend_to(106);
    source.switch_to(fork);
    assert_eq!(coordinator.step().await.unwrap(), Progress::ForkDetected(106));
    assert!(coordinator.step().await.is_err());
    drop(coordinator);

    let states = reader.await.unwrap();
    assert_eq!(states, vec![State::Reconciling, State::Idle]);
}

#[tokio::test]
async fn test_run_returns_fatal_error() {
    let chain = main_chain();
    let source = MockChain::new(chain.fork(103, ""));
    let settings = Settings {
        lookback: 1,
        ..settings()
    };
    let (mut coordinator, _store) = coordinator(source.clone(), settings).await;
    catch_up(&mut coordinator).await;
    let mut fork = chain.fork(102, "b");
    fork.extend_to(103);
    source.switch_to(fork);

    let err = tokio::time::timeout(Duration::from_secs(5), coordinator.run())
        .await
        .unwrap();
    assert!(matches!(err, TrackingError::NoCommonAncestor { head: 102, .. }));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let chain = main_chain();
    let (mut coordinator, store) = coordinator(MockChain::new(chain.clone()), settings()).await;

    store.fail_next_commits(2);
    assert_eq!(
        coordinator.step().await.unwrap(),
        Progress::Included(Head::new(100, hash(100, "")))
    );
    assert_eq!(store.commits(), 1);
    catch_up(&mut coordinator).await;
    assert_eq!(*store.snapshot(), *replay(&chain).await.snapshot());
}

#[tokio::test]
async fn test_exhausted_retries_keep_coordinator_alive() {
    let chain = main_chain();
    let settings = Settings {
        max_retries: 1,
        ..settings()
    };
    let (mut coordinator, store) = coordinator(MockChain::new(chain.clone()), settings).await;

    store.fail_next_commits(5);
    let err = coordinator.step().await.unwrap_err();
    match err {
        TrackingError::Mutation(e) => assert!(e.is_transient()),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(coordinator.state(), State::Following);
    assert!(coordinator.head().is_initial());

    store.heal();
    assert_eq!(
        coordinator.step().await.unwrap(),
        Progress::Included(Head::new(100, hash(100, "")))
    );
}

#[tokio::test]
async fn test_node_outage_means_waiting() {
    let chain = main_chain();
    let source = MockChain::new(chain);
    let (mut coordinator, _store) = coordinator(source.clone(), settings()).await;

    source.fail_next(1);
    assert_eq!(coordinator.step().await.unwrap(), Progress::Waiting);
    assert_eq!(coordinator.state(), State::Following);
    assert!(matches!(
        coordinator.step().await.unwrap(),
        Progress::Included(_)
    ));
}

#[tokio::test]
async fn test_inconsistent_block_stops_coordinator() {
    let mut chain = main_chain().fork(102, "");
    chain.push(vec![ops::transaction(BOB, ALICE, 1_000_000, 0)]);
    let (mut coordinator, store) = coordinator(MockChain::new(chain), settings()).await;

    let steps = catch_up_or_fail(&mut coordinator).await;
    assert_eq!(steps, 2);
    assert_eq!(coordinator.state(), State::Idle);
    assert_eq!(coordinator.head().level, 101);
    assert_eq!(store.snapshot().app_state().unwrap().level, 101);
    assert!(matches!(coordinator.step().await, Err(TrackingError::Idle)));
}

/// Number of blocks included before the first error.
async fn catch_up_or_fail(coordinator: &mut Coordinator<MemoryStore, MockChain>) -> Level {
    let mut included = 0;
    loop {
        match coordinator.step().await {
            Ok(Progress::Included(_)) => included += 1,
            Ok(progress) => panic!("unexpected {progress:?}"),
            Err(TrackingError::Mutation(MutationError::Consistency { .. })) => return included,
            Err(e) => panic!("unexpected error {e}"),
        }
    }
}
