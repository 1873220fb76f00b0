//! The gossip wire envelope.
//!
//! Each node runs one engine per chain, so every message names its chain
//! alongside the message kind. Tags travel as their stable numeric
//! values; the payload is the JSON-encoded consensus record.

use agora_consensus::{ChainTag, MessageKind};
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub chain: u8,
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(chain: ChainTag, kind: MessageKind, payload: Vec<u8>) -> Self {
        Self { chain: chain.as_u8(), kind: kind.as_u8(), payload }
    }

    pub fn chain_tag(&self) -> Result<ChainTag> {
        ChainTag::from_u8(self.chain).ok_or(NetworkError::UnknownChainTag(self.chain))
    }

    pub fn message_kind(&self) -> Result<MessageKind> {
        MessageKind::from_u8(self.kind).ok_or(NetworkError::UnknownMessageKind(self.kind))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip() {
        let env = Envelope::new(ChainTag::Table, MessageKind::Proposal, vec![1, 2, 3]);
        let back = Envelope::from_bytes(&env.to_bytes().unwrap()).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.chain_tag().unwrap(), ChainTag::Table);
        assert_eq!(back.message_kind().unwrap(), MessageKind::Proposal);
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let env = Envelope { chain: 9, kind: 9, payload: Vec::new() };
        assert!(env.chain_tag().is_err());
        assert!(env.message_kind().is_err());
    }
}
