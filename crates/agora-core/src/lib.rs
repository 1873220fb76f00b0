//! # Agora Core
//!
//! Core types for the Agora node: hashes and addresses, the
//! consensus-level block, and the per-round chain record.

pub mod block;
pub mod chain;
pub mod error;
pub mod types;

pub use block::{Block, ConsensusKind};
pub use chain::Blockchain;
pub use error::{CoreError, Result};
pub use types::{Address, Hash};
