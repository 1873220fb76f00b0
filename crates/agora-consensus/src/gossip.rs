//! The gossip seam between the engine and whatever carries its bytes.
//!
//! The engine only ever fans out; the transport only ever hands bytes
//! back in. Both directions are traits so the transport (gRPC, an
//! in-process hub, a test harness) stays an external collaborator.

/// Wire message kinds. The numeric values are part of the wire format,
/// distinct and stable across every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Vote,
    Proposal,
    Block,
}

impl MessageKind {
    pub fn as_u8(self) -> u8 {
        match self {
            MessageKind::Vote => 0,
            MessageKind::Proposal => 1,
            MessageKind::Block => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MessageKind::Vote),
            1 => Some(MessageKind::Proposal),
            2 => Some(MessageKind::Block),
            _ => None,
        }
    }
}

/// Which of the node's two chains a message belongs to. Each chain runs
/// its own engine with its own peer store, so the tag routes inbound
/// messages; it is part of the wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainTag {
    Data,
    Table,
}

impl ChainTag {
    pub fn as_u8(self) -> u8 {
        match self {
            ChainTag::Data => 0,
            ChainTag::Table => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ChainTag::Data),
            1 => Some(ChainTag::Table),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChainTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainTag::Data => write!(f, "data"),
            ChainTag::Table => write!(f, "table"),
        }
    }
}

/// Outbound fan-out: deliver to every peer except self, best-effort,
/// at-most-once per peer. Duplicates on the receiving side are harmless.
pub trait Gossip: Send + Sync {
    fn gossip(&self, chain: ChainTag, kind: MessageKind, payload: Vec<u8>);
}

/// Inbound dispatch: the transport hands a parsed-enough `(kind, bytes)`
/// pair to the peer store of the engine the envelope addressed.
pub trait Inbound: Send + Sync {
    fn deliver(&self, kind: MessageKind, payload: &[u8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        for kind in [MessageKind::Vote, MessageKind::Proposal, MessageKind::Block] {
            assert_eq!(MessageKind::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(MessageKind::from_u8(3), None);
        // Pin the wire values; peers depend on them.
        assert_eq!(MessageKind::Vote.as_u8(), 0);
        assert_eq!(MessageKind::Proposal.as_u8(), 1);
        assert_eq!(MessageKind::Block.as_u8(), 2);
    }

    #[test]
    fn chain_tags_are_stable() {
        assert_eq!(ChainTag::from_u8(0), Some(ChainTag::Data));
        assert_eq!(ChainTag::from_u8(1), Some(ChainTag::Table));
        assert_eq!(ChainTag::from_u8(2), None);
    }
}
