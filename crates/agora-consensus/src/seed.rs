//! The per-round VRF seed chain.
//!
//! Each block carries the seed for the next round, normally the
//! proposer's VRF over `prev_seed || round`. Before extending the chain a
//! node re-checks the previous block's seed; if that check fails the
//! round falls back to the unprovable hash chain
//! `SHA256(prev_seed || round)` so agreement on a seed always exists.

use agora_core::Blockchain;
use agora_crypto::{sha256, sha256_concat, Keypair};

use crate::error::Result;

/// Derive `(seed, proof)` for `round`. An empty proof marks an
/// unprovable seed: the genesis seed or the hash-chained fallback.
pub fn vrf_seed(chain: &Blockchain, keypair: &Keypair, round: u64) -> Result<(Vec<u8>, Vec<u8>)> {
    if round == 0 {
        return Ok((chain.genesis().seed, Vec::new()));
    }
    let last = chain.get_by_round(round - 1);

    // The genesis seed needs no checking; from round 2 on, validate the
    // seed the previous block committed to before building on it.
    if round != 1 && !previous_seed_is_valid(chain, &last) {
        let fallback = sha256_concat(&[&last.seed, &round.to_be_bytes()]);
        return Ok((fallback.to_vec(), Vec::new()));
    }

    let message = [last.seed.as_slice(), &round.to_be_bytes()].concat();
    Ok(keypair.evaluate(&message)?)
}

fn previous_seed_is_valid(chain: &Blockchain, last: &agora_core::Block) -> bool {
    let Some(parent) = chain.get(&last.parent_hash, last.round.wrapping_sub(1)) else {
        return false;
    };
    let message = [parent.seed.as_slice(), &last.round.to_be_bytes()].concat();
    if !last.proof.is_empty() {
        // VRF-based seed: the proof must verify under the proposer's key
        // and commit to exactly the stored seed.
        match last.recover_pubkey() {
            Ok(pubkey) => pubkey
                .verify_vrf(&last.proof, &message)
                .map(|value| value.as_slice() == last.seed)
                .unwrap_or(false),
            Err(_) => false,
        }
    } else {
        // Hash-based fallback seed.
        last.seed.as_slice() == sha256(&message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{Address, Block};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn keypair() -> Keypair {
        Keypair::from_seed([42u8; 32]).unwrap()
    }

    /// A properly sealed round-1 block: seed evaluated over the genesis
    /// seed, signed so the pubkey can be recovered.
    fn sealed_round_one(chain: &Blockchain, kp: &Keypair) -> Block {
        let genesis = chain.genesis();
        let message = [genesis.seed.as_slice(), &1u64.to_be_bytes()].concat();
        let (seed, proof) = kp.evaluate(&message).unwrap();
        let mut block = Block::empty(1, genesis.hash());
        block.author = Address::from_slice(kp.public().as_bytes());
        block.time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        block.seed = seed;
        block.proof = proof;
        block.sign(kp);
        block
    }

    #[test]
    fn round_zero_returns_genesis_seed_without_proof() {
        let chain = Blockchain::new();
        let (seed, proof) = vrf_seed(&chain, &keypair(), 0).unwrap();
        let expected = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(hex::encode(&seed), expected);
        assert!(proof.is_empty());
    }

    #[test]
    fn round_one_evaluates_over_genesis_seed() {
        let chain = Blockchain::new();
        let kp = keypair();
        let (seed, proof) = vrf_seed(&chain, &kp, 1).unwrap();
        let message = [chain.genesis().seed.as_slice(), &1u64.to_be_bytes()].concat();
        let (expected_seed, expected_proof) = kp.evaluate(&message).unwrap();
        assert_eq!(seed, expected_seed);
        assert_eq!(proof, expected_proof);
    }

    #[test]
    fn valid_previous_seed_keeps_the_vrf_chain() {
        let chain = Blockchain::new();
        let kp = keypair();
        let block = sealed_round_one(&chain, &kp);
        chain.add(block.clone());

        let (seed, proof) = vrf_seed(&chain, &kp, 2).unwrap();
        let message = [block.seed.as_slice(), &2u64.to_be_bytes()].concat();
        let (expected_seed, _) = kp.evaluate(&message).unwrap();
        assert_eq!(seed, expected_seed);
        assert!(!proof.is_empty());
    }

    #[test]
    fn corrupted_proof_falls_back_to_hash_chain() {
        let chain = Blockchain::new();
        let kp = keypair();
        let mut block = sealed_round_one(&chain, &kp);
        block.proof[7] ^= 0xff;
        chain.add(block.clone());

        let (seed, proof) = vrf_seed(&chain, &kp, 2).unwrap();
        let expected = sha256_concat(&[&block.seed, &2u64.to_be_bytes()]);
        assert_eq!(seed, expected.to_vec());
        assert!(proof.is_empty());
    }

    #[test]
    fn tampered_hash_fallback_seed_is_rejected() {
        let chain = Blockchain::new();
        let kp = keypair();
        let mut block = sealed_round_one(&chain, &kp);
        // Pretend the previous round already fell back, but with a bogus
        // chained seed.
        block.proof = Vec::new();
        block.seed = sha256(b"bogus").to_vec();
        chain.add(block.clone());

        let (seed, proof) = vrf_seed(&chain, &kp, 2).unwrap();
        let expected = sha256_concat(&[&block.seed, &2u64.to_be_bytes()]);
        assert_eq!(seed, expected.to_vec());
        assert!(proof.is_empty());
    }
}
