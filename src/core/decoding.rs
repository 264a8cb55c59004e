//! Turns raw node payloads into the typed records the engine consumes.
//!
//! Decoding is all or nothing at the block level: a block with a single
//! undecodable operation never reaches the engine.
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::node::models::NodeBlock;
use crate::core::types::Level;
use crate::core::types::ProtocolHash;
use crate::core::types::Timestamp;
use crate::schema::DecodedBlock;
use crate::schema::DecodedOperation;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported protocol {0}")]
    UnsupportedProtocol(ProtocolHash),
    #[error("malformed operation {index} of block {level}: {source}")]
    MalformedOperation {
        level: Level,
        index: usize,
        source: serde_json::Error,
    },
    #[error("malformed operation: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("requested block at level {requested}, got level {got}")]
    UnexpectedLevel { requested: Level, got: Level },
    #[error("invalid timestamp {0}")]
    Timestamp(String),
}

/// Protocol specific operation decoding.
pub trait ProtocolDecoder: Send + Sync {
    fn decode(
        &self,
        raw: &serde_json::Value,
        protocol: &ProtocolHash,
    ) -> Result<DecodedOperation, DecodeError>;
}

/// Decoder of operations already normalized by the node, tagged by `kind`.
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    /// Protocols accepted, any when empty
    protocols: HashSet<ProtocolHash>,
}

impl JsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts decoding to the given protocols.
    pub fn with_protocols<I: IntoIterator<Item = ProtocolHash>>(protocols: I) -> Self {
        Self {
            protocols: protocols.into_iter().collect(),
        }
    }
}

impl ProtocolDecoder for JsonDecoder {
    fn decode(
        &self,
        raw: &serde_json::Value,
        protocol: &ProtocolHash,
    ) -> Result<DecodedOperation, DecodeError> {
        if !self.protocols.is_empty() && !self.protocols.contains(protocol) {
            return Err(DecodeError::UnsupportedProtocol(protocol.clone()));
        }
        Ok(DecodedOperation::deserialize(raw)?)
    }
}

/// Decodes all operations of a node block.
pub fn decode_block<D: ProtocolDecoder + ?Sized>(
    decoder: &D,
    block: NodeBlock,
) -> Result<DecodedBlock, DecodeError> {
    let header = block.header;
    let mut operations = Vec::with_capacity(block.operations.len());
    for (index, raw) in block.operations.iter().enumerate() {
        let op = decoder
            .decode(raw, &header.protocol)
            .map_err(|e| match e {
                DecodeError::Malformed(source) => DecodeError::MalformedOperation {
                    level: header.level,
                    index,
                    source,
                },
                e => e,
            })?;
        operations.push(op);
    }
    Ok(DecodedBlock {
        level: header.level,
        timestamp: parse_timestamp(&header.timestamp)?,
        hash: header.hash,
        predecessor: header.predecessor,
        protocol: header.protocol,
        payload_round: header.payload_round,
        proposer: block.proposer,
        producer: block.producer,
        reward: block.reward,
        bonus: block.bonus,
        operations,
    })
}

/// Converts an RFC 3339 timestamp to unix milliseconds.
pub fn parse_timestamp(s: &str) -> Result<Timestamp, DecodeError> {
    let dt = OffsetDateTime::parse(s, &Rfc3339).map_err(|_| DecodeError::Timestamp(s.to_owned()))?;
    Ok((dt.unix_timestamp_nanos() / 1_000_000) as Timestamp)
}

/// Formats unix milliseconds as an RFC 3339 timestamp.
pub fn format_timestamp(t: Timestamp) -> Result<String, DecodeError> {
    OffsetDateTime::from_unix_timestamp_nanos(t as i128 * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .ok_or_else(|| DecodeError::Timestamp(t.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::models::NodeHeader;
    use crate::schema::OperationKind;
    use crate::schema::OperationRecord;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use time::macros::datetime;

    fn node_block(operations: Vec<serde_json::Value>) -> NodeBlock {
        NodeBlock {
            header: NodeHeader {
                level: 100,
                hash: String::from("BLock100"),
                predecessor: String::from("BLock99"),
                timestamp: String::from("2023-06-01T12:00:30Z"),
                protocol: String::from("PtNairobi"),
                payload_round: 0,
            },
            proposer: String::from("tz1baker"),
            producer: None,
            reward: 0,
            bonus: 0,
            operations,
        }
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:01Z").unwrap(), 1000);
        let t = datetime!(2023-06-01 12:00:30 UTC);
        assert_eq!(parse_timestamp("2023-06-01T12:00:30Z").unwrap(), t.unix_timestamp() * 1000);
        assert_eq!(parse_timestamp("2023-06-01T12:00:30.250Z").unwrap(), 1685620830250);
        assert_eq!(format_timestamp(1685620830000).unwrap(), "2023-06-01T12:00:30Z");
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_decode_block() {
        let raw = json!({
            "sender": "tz1alice",
            "content": {"kind": "reveal", "public_key": "edpk"},
        });
        let block = decode_block(&JsonDecoder::new(), node_block(vec![raw])).unwrap();
        assert_eq!(block.level, 100);
        assert_eq!(block.timestamp, 1685620830000);
        assert_eq!(block.operations.len(), 1);
        assert_eq!(block.operations[0].kind(), OperationKind::Reveal);
    }

    #[test]
    fn test_malformed_operation_rejects_block() {
        let ok = json!({
            "sender": "tz1alice",
            "content": {"kind": "reveal", "public_key": "edpk"},
        });
        let bad = json!({"sender": "tz1alice", "content": {"kind": "teleport"}});
        let res = decode_block(&JsonDecoder::new(), node_block(vec![ok, bad]));
        match res {
            Err(DecodeError::MalformedOperation { level, index, .. }) => {
                assert_eq!(level, 100);
                assert_eq!(index, 1);
            }
            other => panic!("expected a malformed operation, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_protocol() {
        let decoder = JsonDecoder::with_protocols([String::from("PtMumbai")]);
        let raw = json!({"sender": "tz1alice", "content": {"kind": "reveal"}});
        let res = decoder.decode(&raw, &String::from("PtNairobi"));
        assert!(matches!(res, Err(DecodeError::UnsupportedProtocol(_))));
    }
}
