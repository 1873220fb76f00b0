//! Gossiped consensus records: committee votes and block proposals.
//!
//! Votes carry a recoverable signature, so verification starts from the
//! signature alone; proposals carry the proposer's pubkey explicitly.

use agora_core::{Address, Hash};
use agora_crypto::{recover_pubkey, verify_recoverable, Keypair, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::{ConsensusError, Result};
use crate::params::EXPECTED_PROPOSERS;
use crate::sortition::{max_priority, sub_users};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub round: u64,
    pub step: u64,
    /// Committee sortition VRF value.
    pub vrf: Vec<u8>,
    /// Committee sortition VRF proof.
    pub proof: Vec<u8>,
    /// The chain tip this vote extends.
    pub parent_hash: Hash,
    /// The block hash being voted for.
    pub hash: Hash,
    pub signature: Vec<u8>,
}

impl VoteMessage {
    pub fn new(
        round: u64,
        step: u64,
        vrf: Vec<u8>,
        proof: Vec<u8>,
        parent_hash: Hash,
        hash: Hash,
    ) -> Self {
        Self { round, step, vrf, proof, parent_hash, hash, signature: Vec::new() }
    }

    fn signing_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.vrf.len() + self.proof.len() + 64);
        out.extend_from_slice(&self.round.to_be_bytes());
        out.extend_from_slice(&self.step.to_be_bytes());
        out.extend_from_slice(&self.vrf);
        out.extend_from_slice(&self.proof);
        out.extend_from_slice(&self.parent_hash);
        out.extend_from_slice(&self.hash);
        out
    }

    pub fn sign(&mut self, keypair: &Keypair) {
        self.signature = keypair.sign(&self.signing_payload());
    }

    /// Recover the voter and check the signature in one step.
    pub fn verify_signature(&self) -> Result<PublicKey> {
        Ok(verify_recoverable(&self.signing_payload(), &self.signature)?)
    }

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

/// A proposer's announcement that it holds a candidate block for `round`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub round: u64,
    /// Hash of the proposed block (gossiped separately).
    pub hash: Hash,
    /// Max priority over the proposer's sub-users; the tie-breaker.
    pub prior: Vec<u8>,
    pub vrf: Vec<u8>,
    pub proof: Vec<u8>,
    pub pubkey: Vec<u8>,
}

impl Proposal {
    pub fn public_key(&self) -> Result<PublicKey> {
        Ok(PublicKey::from_bytes(&self.pubkey)?)
    }

    pub fn address(&self) -> Address {
        Address::from_slice(&self.pubkey)
    }

    /// Verify the proposer sortition behind this proposal: the VRF proof
    /// over `seed || role`, the committed value, and that `prior` really
    /// is the max priority of the resulting sub-users.
    pub fn verify(&self, weight: u64, seed_role_msg: &[u8]) -> Result<()> {
        let pubkey = self.public_key()?;
        let value = pubkey
            .verify_vrf(&self.proof, seed_role_msg)
            .map_err(|_| ConsensusError::VerifyFailed("proposal vrf proof".into()))?;
        if value.as_slice() != self.vrf {
            return Err(ConsensusError::VerifyFailed("proposal vrf value".into()));
        }
        let selected = sub_users(EXPECTED_PROPOSERS, weight, &self.vrf);
        if max_priority(&self.vrf, selected) != self.prior {
            return Err(ConsensusError::VerifyFailed("max priority mismatch".into()));
        }
        Ok(())
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
    use crate::params::TOKENS_PER_USER;
    use crate::sortition::{role, seed_role_message, sortition};
    use crate::params::{ROLE_PROPOSER, STEP_PROPOSE};
    use agora_crypto::sha256;

    fn signed_vote(keypair: &Keypair) -> VoteMessage {
        let mut vote = VoteMessage::new(
            4,
            2,
            vec![1, 2, 3],
            vec![4, 5, 6],
            sha256(b"parent"),
            sha256(b"target"),
        );
        vote.sign(keypair);
        vote
    }

    #[test]
    fn vote_sign_verify_roundtrip() {
        let kp = Keypair::from_seed([8u8; 32]).unwrap();
        let vote = signed_vote(&kp);
        let voter = vote.verify_signature().unwrap();
        assert_eq!(&voter, kp.public());
    }

    #[test]
    fn vote_tamper_detected() {
        let kp = Keypair::from_seed([8u8; 32]).unwrap();
        let mut vote = signed_vote(&kp);
        vote.hash = sha256(b"other target");
        assert!(vote.verify_signature().is_err());
    }

    #[test]
    fn vote_serde_roundtrip() {
        let kp = Keypair::from_seed([8u8; 32]).unwrap();
        let vote = signed_vote(&kp);
        let back = VoteMessage::from_bytes(&vote.to_bytes().unwrap()).unwrap();
        assert_eq!(back, vote);
    }

    #[test]
    fn proposal_from_own_draw_verifies() {
        let kp = Keypair::from_seed([11u8; 32]).unwrap();
        let seed = sha256(b"round seed");
        let role_bytes = role(ROLE_PROPOSER, 1, STEP_PROPOSE);
        let draw = sortition(&kp, &seed, &role_bytes, EXPECTED_PROPOSERS, TOKENS_PER_USER).unwrap();
        let proposal = Proposal {
            round: 1,
            hash: sha256(b"candidate"),
            prior: max_priority(&draw.vrf, draw.sub_users),
            vrf: draw.vrf,
            proof: draw.proof,
            pubkey: kp.public().to_vec(),
        };
        let msg = seed_role_message(&seed, &role_bytes);
        proposal.verify(TOKENS_PER_USER, &msg).unwrap();
    }

    #[test]
    fn proposal_with_forged_prior_rejected() {
        let kp = Keypair::from_seed([11u8; 32]).unwrap();
        let seed = sha256(b"round seed");
        let role_bytes = role(ROLE_PROPOSER, 1, STEP_PROPOSE);
        let draw = sortition(&kp, &seed, &role_bytes, EXPECTED_PROPOSERS, TOKENS_PER_USER).unwrap();
        let proposal = Proposal {
            round: 1,
            hash: sha256(b"candidate"),
            prior: sha256(b"forged priority").to_vec(),
            vrf: draw.vrf,
            proof: draw.proof,
            pubkey: kp.public().to_vec(),
        };
        let msg = seed_role_message(&seed, &role_bytes);
        assert!(proposal.verify(TOKENS_PER_USER, &msg).is_err());
    }

    #[test]
    fn proposal_serde_roundtrip() {
        let proposal = Proposal {
            round: 2,
            hash: sha256(b"blk"),
            prior: vec![9; 32],
            vrf: vec![1; 32],
            proof: vec![2; 80],
            pubkey: vec![3; 32],
        };
        let back = Proposal::from_bytes(&proposal.to_bytes().unwrap()).unwrap();
        assert_eq!(back, proposal);
    }
}
