use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::oneshot;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Json;
use axum::response::Response;
use axum::routing;
use axum::Router;

use super::chain::TestChain;
use tzindex::core::decoding::format_timestamp;
use tzindex::core::testing::NodeBlock;
use tzindex::core::testing::NodeHeader;
use tzindex::schema::DecodedBlock;

type Blocks = Arc<RwLock<Vec<NodeBlock>>>;

async fn wait_some() {
    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
}

/// Tezos node api mockup, serving the blocks of a test chain.
pub struct MockNode {
    port: u16,
    url: String,
    blocks: Blocks,
    term_tx: Option<oneshot::Sender<()>>,
}

impl MockNode {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            url: format!("http://127.0.0.1:{port}"),
            blocks: Arc::new(RwLock::new(vec![])),
            term_tx: None,
        }
    }

    /// External url to be queried by clients
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Replaces served blocks with those of `chain`.
    pub fn set_chain(&self, chain: &TestChain) {
        let blocks = chain.blocks().iter().map(node_block).collect();
        *self.blocks.write().unwrap() = blocks;
    }

    /// Replaces the raw operations of the block at `level`.
    pub fn set_operations(&self, level: i32, operations: Vec<serde_json::Value>) {
        let mut blocks = self.blocks.write().unwrap();
        let block = blocks
            .iter_mut()
            .find(|b| b.header.level == level)
            .expect("served block");
        block.operations = operations;
    }

    pub async fn serve(&mut self) {
        if self.term_tx.is_some() {
            panic!("Can't start a MockNode that's already running");
        }
        let app = Router::new()
            .route("/chains/main/blocks/:block", routing::get(block))
            .route("/chains/main/blocks/:block/header", routing::get(header))
            .with_state(self.blocks.clone());

        let address = format!("127.0.0.1:{}", self.port);
        let (tx, rx) = oneshot::channel();
        self.term_tx = Some(tx);
        tokio::spawn(async move {
            tracing::info!("Starting MockNode server listening on {}", &address);
            tokio::select! {
                _ = axum::Server::bind(&address.parse().unwrap())
                    .serve(app.into_make_service()) => {},
                _ = rx => {tracing::info!("Stopped server")},
            }
        });
        // Wait some to ensure server is ready
        wait_some().await;
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.term_tx.take() {
            tx.send(()).unwrap();
            wait_some().await;
        }
    }
}

/// Node representation of a test block.
pub fn node_block(block: &DecodedBlock) -> NodeBlock {
    NodeBlock {
        header: NodeHeader {
            level: block.level,
            hash: block.hash.clone(),
            predecessor: block.predecessor.clone(),
            timestamp: format_timestamp(block.timestamp).unwrap(),
            protocol: block.protocol.clone(),
            payload_round: block.payload_round,
        },
        proposer: block.proposer.clone(),
        producer: block.producer.clone(),
        reward: block.reward,
        bonus: block.bonus,
        operations: block
            .operations
            .iter()
            .map(|op| serde_json::to_value(op).unwrap())
            .collect(),
    }
}

/// Finds the block with given `id`, a level or `head`.
fn find(blocks: &[NodeBlock], id: &str) -> Option<NodeBlock> {
    match id {
        "head" => blocks.last().cloned(),
        _ => {
            let level: i32 = id.parse().ok()?;
            blocks.iter().find(|b| b.header.level == level).cloned()
        }
    }
}

/// Mock of `/chains/main/blocks/{block}`
async fn block(State(blocks): State<Blocks>, Path(id): Path<String>) -> Response {
    tracing::debug!("block {id}");
    let found = find(&blocks.read().unwrap(), &id);
    match found {
        Some(block) => Json(block).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Mock of `/chains/main/blocks/{block}/header`
async fn header(State(blocks): State<Blocks>, Path(id): Path<String>) -> Response {
    tracing::debug!("header {id}");
    let found = find(&blocks.read().unwrap(), &id);
    match found {
        Some(block) => Json(block.header).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
