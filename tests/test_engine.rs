mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio;

use common::account;
use common::assert_consistent;
use common::chain::hash;
use common::chain::TestChain;
use common::chain::BAKER;
use common::constants;
use common::has_account;
use common::ops;
use tzindex::core::types::testutils::random_hash;
use tzindex::core::types::Level;
use tzindex::engine::Engine;
use tzindex::engine::Inconsistency;
use tzindex::engine::MutationError;
use tzindex::schema::Counter;
use tzindex::schema::Entity;
use tzindex::schema::OperationKind;
use tzindex::schema::Proposal;
use tzindex::schema::RowKey;
use tzindex::schema::StakingUpdate;
use tzindex::schema::StakingUpdateCause;
use tzindex::schema::Table;
use tzindex::schema::VotingPeriod;
use tzindex::store::memory::Tables;
use tzindex::store::MemoryStore;

const ALICE: &str = "tz1alice";
const BOB: &str = "tz1bob";
const CAROL: &str = "tz1carol";
const DAVE: &str = "tz1dave";
const KT1: &str = "KT1token";
const ROLLUP: &str = "sr1rollup";

async fn engine() -> (Engine<MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    let engine = Engine::new(store.clone(), constants()).await.unwrap();
    (engine, store)
}

/// A chain exercising most kinds of mutations, crossing cycle and voting
/// period boundaries.
fn busy_chain() -> TestChain {
    let mut chain = TestChain::new(100);
    chain.push(vec![
        ops::bootstrap(BAKER, 5000),
        ops::activate_delegate(BAKER),
        ops::bootstrap(ALICE, 10000),
    ]);
    chain.push(vec![ops::transaction(ALICE, BOB, 500, 10)]);
    chain.push(vec![ops::delegation(ALICE, Some(BAKER))]);
    let mut origination = ops::origination(ALICE, KT1, 1000, None);
    origination["effects"] = json!({
        "big_map_diffs": [ops::big_map_alloc(1, KT1), ops::big_map_update(1, ALICE, Some(5))],
    });
    chain.push(vec![origination]);
    chain.push(vec![ops::call(
        ALICE,
        KT1,
        json!({
            "big_map_diffs": [ops::big_map_update(1, BOB, Some(3))],
            "ticket_transfers": [ops::ticket(KT1, None, Some(ALICE), 10)],
            "token_transfers": [ops::token(KT1, None, Some(ALICE), 100)],
        }),
    )]);
    chain.push_with(vec![ops::stake(ALICE, 2000)], |b| b.reward = 20);
    chain.push(vec![
        ops::call(
            BOB,
            KT1,
            json!({"ticket_transfers": [ops::ticket(KT1, Some(ALICE), Some(BOB), 4)]}),
        ),
        ops::failed_transaction(BOB, ALICE, 100000, 5),
    ]);
    chain.push(vec![ops::upvote(BAKER, 6, "PtNext", 5000)]);
    chain.push(vec![
        ops::unstake(ALICE, 500),
        ops::call(
            ALICE,
            KT1,
            json!({"big_map_diffs": [ops::big_map_update(1, ALICE, None)]}),
        ),
    ]);
    chain.push(vec![ops::finalize(ALICE, 500, 13)]);
    chain.push(vec![ops::delegation(ALICE, None)]);
    chain.push(vec![ops::call(
        ALICE,
        KT1,
        json!({
            "ticket_transfers": [ops::ticket(KT1, None, Some(ALICE), 7)],
            "token_transfers": [ops::token(KT1, Some(ALICE), Some(BOB), 30)],
        }),
    )]);
    chain.extend_to(111);
    chain.push(vec![ops::transaction(BOB, CAROL, 100, 1)]);
    chain.extend_to(115);
    chain
}

/// Consensus, governance, slashing and rollup operations within one voting period.
fn protocol_chain() -> TestChain {
    let mut chain = TestChain::new(96);
    chain.push(vec![
        ops::bootstrap(BAKER, 5000),
        ops::activate_delegate(BAKER),
        ops::bootstrap(DAVE, 4000),
        ops::activate_delegate(DAVE),
        ops::bootstrap(ALICE, 3000),
        ops::activation(CAROL, 700),
    ]);
    chain.push(vec![
        ops::endorsement(BAKER, "endorsement", 7),
        ops::endorsement(DAVE, "preendorsement", 3),
        ops::nonce_revelation(BAKER, 96, 5),
    ]);
    chain.push(vec![ops::stake(DAVE, 1000), ops::autostake(BAKER, 500)]);
    chain.push(vec![
        ops::double_signing(BAKER, "double_baking", DAVE, 100, 20),
        ops::double_signing(BAKER, "double_endorsing", DAVE, 50, 10),
        ops::double_signing(BAKER, "double_preendorsing", DAVE, 0, 1),
    ]);
    chain.push(vec![
        ops::ballot(BAKER, 6, "PtNext", "yay", 5000),
        ops::ballot(DAVE, 6, "PtNext", "nay", 4000),
        ops::reward(BAKER, "endorsing_reward", 30),
        ops::reward(DAVE, "dal_attestation_reward", 3),
        ops::revelation_penalty(DAVE, 96, 4),
    ]);
    chain.push(vec![
        ops::rollup_originate(ALICE, ROLLUP),
        ops::rollup_publish(ALICE, ROLLUP, 1000),
        ops::rollup_publish(CAROL, ROLLUP, 1000),
    ]);
    chain.push(vec![ops::rollup_refute(ALICE, ROLLUP, ALICE, CAROL, 400, 200)]);
    chain.push(vec![
        ops::rollup_recover_bond(ALICE, ROLLUP, CAROL, 600),
        ops::rollup_recover_bond(ALICE, ROLLUP, ALICE, 1000),
        ops::drain_delegate(DAVE, BOB, 50, 5),
    ]);
    chain.extend_to(105);
    chain
}

fn assert_empty(tables: &Tables) {
    for table in Table::ALL {
        assert_eq!(tables.count(*table), 0, "{table:?}");
    }
    let app = tables.app_state().unwrap();
    assert!(app.head().is_initial());
    for counter in Counter::ALL {
        assert_eq!(app.counter(counter), 0, "{counter:?}");
    }
}

#[tokio::test]
async fn test_simple_transfer() {
    let (mut engine, store) = engine().await;
    let mut chain = TestChain::new(100);
    let block = chain.push(vec![
        ops::bootstrap(ALICE, 1000),
        ops::transaction(ALICE, BOB, 500, 10),
    ]);
    engine.apply_block(&block).await.unwrap();

    let tables = store.snapshot();
    assert_eq!(account(&tables, ALICE).balance, 490);
    assert_eq!(account(&tables, BOB).balance, 500);
    assert_eq!(account(&tables, BAKER).balance, 10);
    let app = tables.app_state().unwrap();
    assert_eq!(app.level, 100);
    assert_eq!(app.hash, hash(100, ""));
    assert_eq!(app.operation_counter, 2);
    assert_eq!(app.ops_counts.get(OperationKind::Transaction), 1);
    assert_eq!(account(&tables, ALICE).ops_counts.get(OperationKind::Transaction), 1);
    assert_eq!(account(&tables, BOB).ops_counts.get(OperationKind::Transaction), 1);
    assert_eq!(engine.head(), app.head());
    assert_consistent(&store);

    engine.rollback_to(99).await.unwrap();
    let tables = store.snapshot();
    assert_empty(&tables);
    assert!(engine.head().is_initial());
}

#[tokio::test]
async fn test_rollback_then_reapply_is_identity() {
    let (mut engine, store) = engine().await;
    let chain = busy_chain();
    let mut snapshots: BTreeMap<Level, Arc<Tables>> = BTreeMap::new();
    for block in chain.blocks() {
        engine.apply_block(block).await.unwrap();
        assert_consistent(&store);
        snapshots.insert(block.level, store.snapshot());
    }
    let head = chain.head().unwrap().level;

    for level in (100..head).rev() {
        engine.rollback_to(level).await.unwrap();
        assert_consistent(&store);
        assert_eq!(*store.snapshot(), *snapshots[&level], "level {level}");
    }
    engine.rollback_to(99).await.unwrap();
    assert_empty(&store.snapshot());

    for block in chain.blocks() {
        engine.apply_block(block).await.unwrap();
    }
    assert_eq!(*store.snapshot(), *snapshots[&head]);
}

#[tokio::test]
async fn test_protocol_operations_roll_back_exactly() {
    let (mut engine, store) = engine().await;
    let chain = protocol_chain();
    let mut snapshots: BTreeMap<Level, Arc<Tables>> = BTreeMap::new();
    for block in chain.blocks() {
        engine.apply_block(block).await.unwrap();
        assert_consistent(&store);
        snapshots.insert(block.level, store.snapshot());
    }

    let tables = store.snapshot();
    let dave = account(&tables, DAVE);
    assert_eq!(dave.staked_balance, 850);
    assert_eq!(dave.balance, 4000 - 100 - 50 - 4 + 3 - 50 - 5);
    assert_eq!(account(&tables, BAKER).staked_balance, 500);
    assert_eq!(account(&tables, BAKER).balance, 5000 + 5 + 20 + 10 + 1 + 30 + 5);
    assert_eq!(account(&tables, ALICE).balance, 3200);
    assert_eq!(account(&tables, ALICE).rollup_bonds, 0);
    assert_eq!(account(&tables, ALICE).smart_rollups_count, 1);
    assert_eq!(account(&tables, CAROL).balance, 300);
    assert_eq!(account(&tables, CAROL).rollup_bonds, 0);
    assert_eq!(account(&tables, BOB).balance, 50);
    let slashes = tables
        .all::<StakingUpdate>()
        .filter(|u| matches!(u.cause, StakingUpdateCause::DoubleBaking(_)))
        .count();
    assert_eq!(slashes, 1);
    assert_eq!(tables.count(Table::StakingUpdate), 4);

    let app = tables.app_state().unwrap();
    assert_eq!(app.total_frozen, 1350);
    assert_eq!(app.total_activated, 700);
    assert_eq!(app.total_rollup_bonds, 0);
    assert_eq!(app.total_created, 12000 + 5 + 31 + 30 + 3);
    assert_eq!(app.total_burned, 150 + 4 + 200);
    assert_eq!(app.ops_counts.get(OperationKind::SmartRollupPublish), 2);
    assert_eq!(app.ops_counts.get(OperationKind::Ballot), 2);
    assert_eq!(app.ops_counts.get(OperationKind::DoublePreendorsing), 1);

    for level in (96..105).rev() {
        engine.rollback_to(level).await.unwrap();
        assert_consistent(&store);
        assert_eq!(*store.snapshot(), *snapshots[&level], "level {level}");
    }
    engine.rollback_to(95).await.unwrap();
    assert_empty(&store.snapshot());
}

#[tokio::test]
async fn test_rollback_of_several_levels_at_once() {
    let (mut engine, store) = engine().await;
    let chain = busy_chain();
    let mut snapshots: BTreeMap<Level, Arc<Tables>> = BTreeMap::new();
    for block in chain.blocks() {
        engine.apply_block(block).await.unwrap();
        snapshots.insert(block.level, store.snapshot());
    }
    let commits = store.commits();
    engine.rollback_to(103).await.unwrap();
    assert_eq!(store.commits(), commits + 12);
    assert_eq!(*store.snapshot(), *snapshots[&103]);
    assert_eq!(engine.head().hash, hash(103, ""));

    // Rolling back to the head or above is a no-op
    engine.rollback_to(103).await.unwrap();
    engine.rollback_to(110).await.unwrap();
    assert_eq!(store.commits(), commits + 12);
}

#[tokio::test]
async fn test_busy_chain_state() {
    let (mut engine, store) = engine().await;
    for block in busy_chain().blocks() {
        engine.apply_block(block).await.unwrap();
    }
    let tables = store.snapshot();
    let alice = account(&tables, ALICE);
    assert_eq!(alice.delegate_id, None);
    assert_eq!(alice.staked_balance, 1500);
    assert_eq!(alice.unstaked_balance, 0);
    assert_eq!(alice.contracts_count, 1);
    assert_eq!(alice.active_tickets_count, 1);
    assert_eq!(alice.active_tokens_count, 1);
    let baker = account(&tables, BAKER);
    assert!(baker.profile.is_delegate());
    assert_eq!(baker.delegators_count, 0);
    // Fees of every operation plus a block reward
    assert_eq!(baker.balance, 5000 + 10 + 5 + 1 + 1 + 2 + 1 + 20);
    assert!(has_account(&tables, CAROL));
    assert_eq!(account(&tables, CAROL).balance, 100);

    let app = tables.app_state().unwrap();
    assert_eq!(app.level, 115);
    assert_eq!(app.cycle, 14);
    assert_eq!(app.voting_period, 7);
    assert_eq!(app.total_frozen, 1500);
    assert_eq!(app.total_created, 15000 + 20);
    assert_eq!(app.total_burned, 3 + 4);
}

#[tokio::test]
async fn test_failed_operation_pays_fees_only() {
    let (mut engine, store) = engine().await;
    let mut chain = TestChain::new(0);
    engine
        .apply_block(&chain.push(vec![ops::bootstrap(BOB, 100)]))
        .await
        .unwrap();
    engine
        .apply_block(&chain.push(vec![ops::failed_transaction(BOB, ALICE, 1000, 5)]))
        .await
        .unwrap();
    let tables = store.snapshot();
    assert_eq!(account(&tables, BOB).balance, 95);
    assert_eq!(account(&tables, ALICE).balance, 0);
    assert_eq!(account(&tables, BAKER).balance, 5);
    assert_consistent(&store);

    // Alice only got referenced by the failed operation
    engine.rollback_to(0).await.unwrap();
    let tables = store.snapshot();
    assert_eq!(account(&tables, BOB).balance, 100);
    assert!(!has_account(&tables, ALICE));
    assert_consistent(&store);
}

#[tokio::test]
async fn test_block_not_extending_head_is_rejected() {
    let (mut engine, store) = engine().await;
    let mut chain = TestChain::new(100);
    engine.apply_block(&chain.push(vec![])).await.unwrap();
    let before = store.snapshot();
    let commits = store.commits();

    let mut orphan = chain.push(vec![ops::bootstrap(ALICE, 1)]);
    orphan.predecessor = random_hash();
    match engine.apply_block(&orphan).await {
        Err(MutationError::Consistency { level, kind }) => {
            assert_eq!(level, 101);
            assert_eq!(
                kind,
                Inconsistency::PredecessorMismatch {
                    expected: hash(100, ""),
                    got: orphan.predecessor.clone(),
                }
            );
        }
        other => panic!("expected a predecessor mismatch, got {other:?}"),
    }

    let mut gap = chain.push(vec![]);
    gap.level = 103;
    match engine.apply_block(&gap).await {
        Err(MutationError::Consistency { kind, .. }) => {
            assert_eq!(kind, Inconsistency::UnexpectedLevel { expected: 101, got: 103 })
        }
        other => panic!("expected an unexpected level, got {other:?}"),
    }
    assert_eq!(store.commits(), commits);
    assert_eq!(*store.snapshot(), *before);
}

#[tokio::test]
async fn test_overspending_is_rejected() {
    let (mut engine, store) = engine().await;
    let mut chain = TestChain::new(100);
    engine
        .apply_block(&chain.push(vec![ops::bootstrap(ALICE, 100)]))
        .await
        .unwrap();
    let before = store.snapshot();
    let block = chain.push(vec![
        ops::transaction(ALICE, BOB, 50, 0),
        ops::transaction(ALICE, BOB, 60, 0),
    ]);
    match engine.apply_block(&block).await {
        Err(MutationError::Consistency { kind, .. }) => {
            assert!(matches!(kind, Inconsistency::NegativeBalance(RowKey::Account(_))))
        }
        other => panic!("expected a negative balance, got {other:?}"),
    }
    assert_eq!(*store.snapshot(), *before);
    assert_eq!(engine.head().level, 100);
}

#[tokio::test]
async fn test_delegation_moves_delegated_balance() {
    let (mut engine, store) = engine().await;
    let mut chain = TestChain::new(100);
    let blocks = [
        chain.push(vec![
            ops::bootstrap(BAKER, 5000),
            ops::activate_delegate(BAKER),
            ops::bootstrap(ALICE, 700),
        ]),
        chain.push(vec![ops::delegation(ALICE, Some(BAKER))]),
        chain.push(vec![ops::bootstrap(ALICE, 300)]),
    ];
    for block in &blocks {
        engine.apply_block(block).await.unwrap();
        assert_consistent(&store);
    }
    let tables = store.snapshot();
    let baker = account(&tables, BAKER);
    assert_eq!(baker.delegators_count, 1);
    assert_eq!(baker.delegated_balance, 999);
    assert_eq!(account(&tables, ALICE).delegate_id, Some(baker.id));

    engine.rollback_to(100).await.unwrap();
    let tables = store.snapshot();
    let baker = account(&tables, BAKER);
    assert_eq!(baker.delegators_count, 0);
    assert_eq!(baker.delegated_balance, 0);
    assert_eq!(account(&tables, ALICE).delegate_id, None);
    assert_consistent(&store);
}

#[tokio::test]
async fn test_upvotes_are_undone() {
    let (mut engine, store) = engine().await;
    let mut chain = TestChain::new(96);
    let blocks = [
        chain.push(vec![ops::bootstrap(BAKER, 5000), ops::activate_delegate(BAKER)]),
        chain.push(vec![ops::upvote(BAKER, 6, "PtNext", 5000)]),
        chain.push(vec![ops::upvote(BAKER, 6, "PtNext", 5000)]),
    ];
    for block in &blocks {
        engine.apply_block(block).await.unwrap();
    }
    let tables = store.snapshot();
    let proposals: Vec<&Proposal> = tables.all::<Proposal>().collect();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].upvotes, 2);
    assert_eq!(proposals[0].first_level, 97);
    assert_eq!(proposals[0].last_level, 111);
    let period = tables
        .get(RowKey::VotingPeriod(6))
        .and_then(VotingPeriod::from_row_ref)
        .unwrap();
    assert_eq!(period.proposals_count, 1);
    assert_eq!(period.top_upvotes, 2);

    engine.rollback_to(97).await.unwrap();
    let tables = store.snapshot();
    assert_eq!(tables.all::<Proposal>().next().unwrap().upvotes, 1);

    engine.rollback_to(96).await.unwrap();
    let tables = store.snapshot();
    assert_eq!(tables.count(Table::Proposal), 0);
    let period = tables
        .get(RowKey::VotingPeriod(6))
        .and_then(VotingPeriod::from_row_ref)
        .unwrap();
    assert_eq!(period.proposals_count, 0);
    assert_eq!(period.top_upvotes, 0);
    assert_eq!(period.participation_power, 0);
    assert_consistent(&store);
}

#[tokio::test]
async fn test_engine_resumes_from_store() {
    let store = MemoryStore::new();
    let chain = busy_chain();
    {
        let mut engine = Engine::new(store.clone(), constants()).await.unwrap();
        for block in &chain.blocks()[..5] {
            engine.apply_block(block).await.unwrap();
        }
    }
    let mut engine = Engine::new(store.clone(), constants()).await.unwrap();
    assert_eq!(engine.head().level, 104);
    for block in &chain.blocks()[5..] {
        engine.apply_block(block).await.unwrap();
    }
    assert_consistent(&store);
    assert_eq!(engine.block_hash(104).await.unwrap(), Some(hash(104, "")));
    assert_eq!(engine.block_hash(99).await.unwrap(), None);
}
