use async_trait::async_trait;
use thiserror::Error;

use crate::core::decoding::decode_block;
use crate::core::decoding::DecodeError;
use crate::core::decoding::ProtocolDecoder;
use crate::core::node::Node;
use crate::core::node::NodeError;
use crate::core::types::BlockHash;
use crate::core::types::Level;
use crate::schema::DecodedBlock;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Provider of main chain blocks.
#[async_trait]
pub trait ChainSource: Send + Sync + 'static {
    /// Level of the current main chain head.
    async fn head_level(&self) -> Result<Level, SourceError>;

    /// Hash of the main chain block at `level`, none beyond the head.
    async fn block_hash(&self, level: Level) -> Result<Option<BlockHash>, SourceError>;

    async fn fetch_block(&self, level: Level) -> Result<DecodedBlock, SourceError>;
}

/// A node, with the decoder of its operations.
pub struct NodeSource<D> {
    node: Node,
    decoder: D,
}

impl<D: ProtocolDecoder> NodeSource<D> {
    pub fn new(node: Node, decoder: D) -> Self {
        Self { node, decoder }
    }
}

#[async_trait]
impl<D: ProtocolDecoder + 'static> ChainSource for NodeSource<D> {
    async fn head_level(&self) -> Result<Level, SourceError> {
        Ok(self.node.api.head_header().await?.level)
    }

    async fn block_hash(&self, level: Level) -> Result<Option<BlockHash>, SourceError> {
        match self.node.api.header(level).await {
            Ok(header) => Ok(Some(header.hash)),
            Err(NodeError::API404Notfound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_block(&self, level: Level) -> Result<DecodedBlock, SourceError> {
        let block = self.node.api.block(level).await?;
        Ok(decode_block(&self.decoder, block)?)
    }
}
