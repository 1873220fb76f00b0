//! # Agora Consensus
//!
//! The BA\* consensus engine: cryptographic sortition, block proposal,
//! two-step reduction, binary Byzantine agreement with a common-coin
//! escape, and the peer message store that backs the tallies.

pub mod engine;
pub mod error;
pub mod gossip;
pub mod message;
pub mod params;
pub mod peer;
pub mod seed;
pub mod sortition;

pub use engine::{Engine, PayloadDescriptor};
pub use error::{ConsensusError, Result};
pub use gossip::{ChainTag, Gossip, Inbound, MessageKind};
pub use message::{Proposal, VoteMessage};
pub use peer::{Peer, VoteCursor};
pub use sortition::{max_priority, sortition, sub_users, verify_sortition, SortitionDraw};
