//! Per-round chain record.
//!
//! Many blocks may be *seen* per round (every proposal the node hears
//! about), but exactly one is ever committed as `last` for a round. The
//! record also serves the refresh-interval sortition seed, which binds
//! committee selection to an older seed so an adversary cannot grind the
//! current round's seed at the last moment.

use std::collections::HashMap;

use agora_crypto::sha256;
use parking_lot::RwLock;

use crate::block::Block;
use crate::types::{Address, Hash};

struct ChainInner {
    genesis: Block,
    last: Block,
    blocks: HashMap<u64, HashMap<Hash, Block>>,
}

pub struct Blockchain {
    inner: RwLock<ChainInner>,
}

impl Blockchain {
    /// A fresh chain: genesis at round 0 with `seed = parent = SHA256(∅)`
    /// and a hash-derived author.
    pub fn new() -> Self {
        let empty = sha256(&[]);
        let mut genesis = Block::empty(0, empty);
        genesis.author = Address::from_hash(&empty);
        genesis.seed = empty.to_vec();

        let mut blocks: HashMap<u64, HashMap<Hash, Block>> = HashMap::new();
        blocks.entry(0).or_default().insert(genesis.hash(), genesis.clone());

        Self {
            inner: RwLock::new(ChainInner {
                last: genesis.clone(),
                genesis,
                blocks,
            }),
        }
    }

    pub fn genesis(&self) -> Block {
        self.inner.read().genesis.clone()
    }

    /// The highest-round committed block.
    pub fn last(&self) -> Block {
        self.inner.read().last.clone()
    }

    pub fn get(&self, hash: &Hash, round: u64) -> Option<Block> {
        self.inner
            .read()
            .blocks
            .get(&round)
            .and_then(|m| m.get(hash))
            .cloned()
    }

    /// Walk backward from `last` following parent hashes until `round`.
    /// Falls back to genesis if the walk runs off a missing link.
    pub fn get_by_round(&self, round: u64) -> Block {
        let inner = self.inner.read();
        let mut current = inner.last.clone();
        while current.round > round {
            let parent = inner
                .blocks
                .get(&(current.round - 1))
                .and_then(|m| m.get(&current.parent_hash));
            match parent {
                Some(block) => current = block.clone(),
                None => return inner.genesis.clone(),
            }
        }
        current
    }

    /// Insert under its round; advance `last` iff the round is higher.
    /// Insertion and the `last` update are atomic under the write lock.
    pub fn add(&self, block: Block) {
        let mut inner = self.inner.write();
        let hash = block.hash();
        inner.blocks.entry(block.round).or_default().insert(hash, block.clone());
        if block.round > inner.last.round {
            inner.last = block;
        }
    }

    /// Seed for sortition at `round`, refreshed every `interval` rounds:
    /// the seed of round `round − 1 − ((round−1) mod interval)`.
    pub fn sortition_seed(&self, round: u64, interval: u64) -> Vec<u8> {
        let interval = interval.max(1);
        let target = if round == 0 {
            0
        } else {
            let real = round - 1;
            real - (real % interval)
        };
        self.get_by_round(target).seed
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_crypto::sha256;

    fn child_of(parent: &Block) -> Block {
        let mut blk = Block::empty(parent.round + 1, parent.hash());
        blk.seed = sha256(&parent.round.to_be_bytes()).to_vec();
        blk
    }

    #[test]
    fn genesis_seed_is_empty_sha256() {
        let chain = Blockchain::new();
        let genesis = chain.genesis();
        let expected = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(hex::encode(&genesis.seed), expected);
        assert_eq!(hex::encode(genesis.parent_hash), expected);
        assert_eq!(genesis.round, 0);
        assert_eq!(chain.last().hash(), genesis.hash());
    }

    #[test]
    fn add_advances_last_only_forward() {
        let chain = Blockchain::new();
        let b1 = child_of(&chain.last());
        chain.add(b1.clone());
        assert_eq!(chain.last().hash(), b1.hash());

        // A second block seen at round 1 does not displace last.
        let mut sibling = child_of(&chain.genesis());
        sibling.data = vec![1];
        chain.add(sibling.clone());
        assert_eq!(chain.last().hash(), b1.hash());
        assert!(chain.get(&sibling.hash(), 1).is_some());
    }

    #[test]
    fn get_by_round_walks_parents() {
        let chain = Blockchain::new();
        let b1 = child_of(&chain.last());
        chain.add(b1.clone());
        let b2 = child_of(&chain.last());
        chain.add(b2.clone());

        assert_eq!(chain.get_by_round(2).hash(), b2.hash());
        assert_eq!(chain.get_by_round(1).hash(), b1.hash());
        assert_eq!(chain.get_by_round(0).hash(), chain.genesis().hash());
    }

    #[test]
    fn sortition_seed_refresh_boundaries() {
        let chain = Blockchain::new();
        let mut blocks = vec![chain.last()];
        for _ in 0..5 {
            let blk = child_of(blocks.last().unwrap());
            chain.add(blk.clone());
            blocks.push(blk);
        }

        // interval 3: rounds 1..=3 use the round-0 seed, 4..=6 the round-3 seed.
        assert_eq!(chain.sortition_seed(1, 3), blocks[0].seed);
        assert_eq!(chain.sortition_seed(3, 3), blocks[0].seed);
        assert_eq!(chain.sortition_seed(4, 3), blocks[3].seed);
        assert_eq!(chain.sortition_seed(5, 3), blocks[3].seed);
    }
}
