// cargo test --test '*' -- --test-threads=1
mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio;

use common::chain::hash;
use common::chain::TestChain;
use common::chain::BAKER;
use common::constants;
use common::node_mockup::node_block;
use common::node_mockup::MockNode;
use common::ops;
use tzindex::core::decoding::DecodeError;
use tzindex::core::decoding::JsonDecoder;
use tzindex::core::testing::NodeBlock;
use tzindex::core::tracking::ChainSource;
use tzindex::core::tracking::Coordinator;
use tzindex::core::tracking::NodeSource;
use tzindex::core::tracking::Progress;
use tzindex::core::tracking::Settings;
use tzindex::core::tracking::SourceError;
use tzindex::core::types::Head;
use tzindex::core::Node;
use tzindex::core::NodeError;
use tzindex::engine::Engine;
use tzindex::store::MemoryStore;

const ALICE: &str = "tz1alice";
const BOB: &str = "tz1bob";

fn chain() -> TestChain {
    let mut chain = TestChain::new(10);
    chain.push(vec![ops::bootstrap(BAKER, 1000), ops::bootstrap(ALICE, 1000)]);
    chain.push(vec![ops::transaction(ALICE, BOB, 300, 2)]);
    chain.extend_to(13);
    chain
}

fn source(node: &MockNode) -> NodeSource<JsonDecoder> {
    NodeSource::new(Node::new("mock", node.url()), JsonDecoder::new())
}

#[tokio::test]
async fn test_mockup_serves_blocks() {
    let chain = chain();
    let mut node = MockNode::new(9061);
    node.set_chain(&chain);
    node.serve().await;

    let url = format!("{}/chains/main/blocks/11", node.url());
    let block: NodeBlock = reqwest::get(url).await.unwrap().json().await.unwrap();
    assert_eq!(block, node_block(chain.block(11)));
    assert_eq!(block.header.timestamp, "2020-09-13T12:32:10Z");

    let url = format!("{}/chains/main/blocks/14/header", node.url());
    let response = reqwest::get(url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    node.stop().await;
}

#[tokio::test]
async fn test_node_source() {
    let chain = chain();
    let mut node = MockNode::new(9062);
    node.set_chain(&chain);
    node.serve().await;
    let source = source(&node);

    assert_eq!(source.head_level().await.unwrap(), 13);
    assert_eq!(source.block_hash(12).await.unwrap(), Some(hash(12, "")));
    assert_eq!(source.block_hash(14).await.unwrap(), None);
    assert_eq!(source.fetch_block(11).await.unwrap(), *chain.block(11));
    assert!(matches!(
        source.fetch_block(20).await,
        Err(SourceError::Node(NodeError::API404Notfound(_)))
    ));
    node.stop().await;
}

#[tokio::test]
async fn test_malformed_operation_fails_decoding() {
    let chain = chain();
    let mut node = MockNode::new(9063);
    node.set_chain(&chain);
    node.set_operations(11, vec![json!({"sender": ALICE, "content": {"kind": "bogus"}})]);
    node.serve().await;
    let source = source(&node);

    match source.fetch_block(11).await {
        Err(SourceError::Decode(DecodeError::MalformedOperation { level, index, .. })) => {
            assert_eq!(level, 11);
            assert_eq!(index, 0);
        }
        other => panic!("unexpected {other:?}"),
    }
    node.stop().await;
}

#[tokio::test]
async fn test_unreachable_node() {
    let node = MockNode::new(9064);
    let source = source(&node);
    assert!(matches!(
        source.head_level().await,
        Err(SourceError::Node(NodeError::NodeUnreachable))
    ));
}

#[tokio::test]
async fn test_coordinator_over_http() {
    let _guard = common::set_tracing_subscriber(false);
    let chain = chain();
    let mut node = MockNode::new(9065);
    node.set_chain(&chain);
    node.serve().await;

    let store = MemoryStore::new();
    let engine = Engine::new(store.clone(), constants()).await.unwrap();
    let settings = Settings {
        start_level: 10,
        ..Settings::default()
    };
    let mut coordinator = Coordinator::new(engine, source(&node), settings);
    for level in 10..=13 {
        assert_eq!(
            coordinator.step().await.unwrap(),
            Progress::Included(Head::new(level, hash(level, "")))
        );
    }
    assert_eq!(coordinator.step().await.unwrap(), Progress::Waiting);

    // Head replaced on the node
    let mut fork = chain.fork(13, "b");
    fork.extend_to(13);
    node.set_chain(&fork);
    assert_eq!(coordinator.step().await.unwrap(), Progress::ForkDetected(13));
    assert_eq!(
        coordinator.step().await.unwrap(),
        Progress::RolledBack(Head::new(12, hash(12, "")))
    );
    assert_eq!(
        coordinator.step().await.unwrap(),
        Progress::Included(Head::new(13, hash(13, "b")))
    );
    node.stop().await;
}
