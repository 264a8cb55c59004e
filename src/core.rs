pub mod decoding;
mod node;
pub mod tracking;
pub mod types;

pub use node::Node;
pub use node::NodeError;

/// Makes some node types available for integration tests mockups.
pub mod testing {
    pub use super::node::models::NodeBlock;
    pub use super::node::models::NodeHeader;
}
