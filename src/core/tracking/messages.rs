use std::sync::Arc;

use crate::core::types::Level;
use crate::schema::DecodedBlock;

/// Chain events broadcast to subscribers once committed to the index.
#[derive(Debug, Clone)]
pub enum TrackingMessage {
    Include(Arc<DecodedBlock>),
    /// Level that was rolled back
    Rollback(Level),
}
