//! The consensus-level block.
//!
//! Distinct from any application block: `data` carries an opaque payload
//! hash handed in by the application chain, and the rest of the fields
//! exist for the agreement protocol itself (VRF seed chain, proposer
//! identity, consensus verdict).

use agora_crypto::{recover_pubkey, sha256_concat, Keypair, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Address, Hash};

/// Consensus verdict attached to a committed block.
///
/// `Final` means the FINAL-step tally matched the BinaryBA output;
/// `Tentative` means agreement was reached without that super-majority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConsensusKind {
    Final,
    #[default]
    Tentative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block number, i.e. height.
    pub round: u64,
    /// Hash of the previous consensus block on the same chain.
    pub parent_hash: Hash,
    /// Proposer address; zero for empty blocks.
    pub author: Address,
    /// Sortition VRF value of the proposer draw.
    pub author_vrf: Vec<u8>,
    /// Sortition VRF proof of the proposer draw.
    pub author_proof: Vec<u8>,
    /// Unix seconds; 0 for empty blocks.
    pub time: i64,
    /// Next-round VRF seed.
    pub seed: Vec<u8>,
    /// Proof for the next-round seed; empty when the seed is the
    /// hash-chained fallback.
    pub proof: Vec<u8>,
    /// Opaque payload, e.g. the hash of an application block.
    pub data: Vec<u8>,

    // Not part of the hash.
    #[serde(rename = "type")]
    pub kind: ConsensusKind,
    /// Proposer signature over the block hash; empty for empty blocks.
    pub signature: Vec<u8>,
}

impl Block {
    /// The deterministic block a round commits when it fails to agree on
    /// any proposal. Carries only round and parent hash.
    pub fn empty(round: u64, parent_hash: Hash) -> Self {
        Self {
            round,
            parent_hash,
            author: Address::zero(),
            author_vrf: Vec::new(),
            author_proof: Vec::new(),
            time: 0,
            seed: Vec::new(),
            proof: Vec::new(),
            data: Vec::new(),
            kind: ConsensusKind::Tentative,
            signature: Vec::new(),
        }
    }

    /// `SHA256(round_be || parent_hash)`: what `hash()` yields for an
    /// empty block, computable without building one.
    pub fn empty_hash(round: u64, parent_hash: &Hash) -> Hash {
        sha256_concat(&[&round.to_be_bytes(), parent_hash])
    }

    /// Canonical block hash. Signature and consensus kind are excluded;
    /// optional fields are appended only when set, so the empty block
    /// hashes to `SHA256(round_be || parent_hash)` on every node.
    pub fn hash(&self) -> Hash {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(8);
        let round_be = self.round.to_be_bytes();
        let time_be = (self.time as u64).to_be_bytes();
        parts.push(&round_be);
        parts.push(&self.parent_hash);
        if !self.author.is_zero() {
            parts.push(self.author.as_ref());
            parts.push(&self.author_vrf);
            parts.push(&self.author_proof);
        }
        if self.time != 0 {
            parts.push(&time_be);
        }
        if !self.seed.is_empty() {
            parts.push(&self.seed);
        }
        if !self.proof.is_empty() {
            parts.push(&self.proof);
        }
        sha256_concat(&parts)
    }

    /// Empty blocks are never signed.
    pub fn is_empty(&self) -> bool {
        self.signature.is_empty()
    }

    /// Sign the block hash with the proposer key (recoverable layout).
    pub fn sign(&mut self, keypair: &Keypair) {
        self.signature = keypair.sign(&self.hash());
    }

    /// Recover the proposer public key from the block signature.
    pub fn recover_pubkey(&self) -> Result<PublicKey> {
        Ok(recover_pubkey(&self.signature)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
