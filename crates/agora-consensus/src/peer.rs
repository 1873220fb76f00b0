//! Peer-level message store.
//!
//! Everything the gossip layer has heard for the engine to consume:
//! incoming votes keyed by `(round, step)`, proposal blocks by hash, and
//! the best-priority proposal per round. Three independent readers–writer
//! locks; vote lists are append-only so a cursor can walk them while new
//! votes keep arriving.

use std::collections::HashMap;
use std::sync::Arc;

use agora_core::{Block, Blockchain, Hash};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::gossip::{Inbound, MessageKind};
use crate::message::{Proposal, VoteMessage};
use crate::params::{ROLE_PROPOSER, SEED_REFRESH_INTERVAL, STEP_PROPOSE, TOKENS_PER_USER};
use crate::sortition::{role, seed_role_message};

/// Append-only list of votes for one `(round, step)`.
pub struct VoteList {
    entries: RwLock<Vec<Arc<VoteMessage>>>,
}

impl VoteList {
    fn new() -> Arc<Self> {
        Arc::new(Self { entries: RwLock::new(Vec::new()) })
    }

    fn push(&self, vote: Arc<VoteMessage>) {
        self.entries.write().push(vote);
    }

    fn get(&self, index: usize) -> Option<Arc<VoteMessage>> {
        self.entries.read().get(index).cloned()
    }

    fn snapshot(&self) -> Vec<Arc<VoteMessage>> {
        self.entries.read().clone()
    }
}

/// Cursor over a vote list in insertion order. `next()` never blocks;
/// it returns `None` when it has caught up, and later appends become
/// visible on subsequent calls because nothing is ever removed.
pub struct VoteCursor {
    list: Arc<VoteList>,
    index: usize,
}

impl VoteCursor {
    pub fn next(&mut self) -> Option<Arc<VoteMessage>> {
        let vote = self.list.get(self.index)?;
        self.index += 1;
        Some(vote)
    }
}

pub struct Peer {
    chain: Arc<Blockchain>,
    weight: u64,
    votes: RwLock<HashMap<(u64, u64), Arc<VoteList>>>,
    blocks: RwLock<HashMap<Hash, Block>>,
    max_proposals: RwLock<HashMap<u64, Proposal>>,
}

impl Peer {
    pub fn new(chain: Arc<Blockchain>) -> Self {
        Self {
            chain,
            weight: TOKENS_PER_USER,
            votes: RwLock::new(HashMap::new()),
            blocks: RwLock::new(HashMap::new()),
            max_proposals: RwLock::new(HashMap::new()),
        }
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    pub fn add_block(&self, hash: Hash, block: Block) {
        self.blocks.write().insert(hash, block);
    }

    pub fn get_block(&self, hash: &Hash) -> Option<Block> {
        self.blocks.read().get(hash).cloned()
    }

    // ── Proposals ───────────────────────────────────────────────────────

    /// Unconditional store. The caller must already have compared
    /// priorities; prefer `offer_max_proposal` when in doubt.
    pub fn set_max_proposal(&self, round: u64, proposal: Proposal) {
        self.max_proposals.write().insert(round, proposal);
    }

    /// Store only if strictly higher priority than the current best, with
    /// the comparison under the write lock so the round's best priority
    /// never decreases under concurrent arrivals.
    pub fn offer_max_proposal(&self, proposal: Proposal) -> bool {
        let mut map = self.max_proposals.write();
        match map.get(&proposal.round) {
            Some(current) if proposal.prior <= current.prior => false,
            _ => {
                map.insert(proposal.round, proposal);
                true
            }
        }
    }

    pub fn get_max_proposal(&self, round: u64) -> Option<Proposal> {
        self.max_proposals.read().get(&round).cloned()
    }

    pub fn clear_proposal(&self, round: u64) {
        self.max_proposals.write().remove(&round);
    }

    // ── Votes ───────────────────────────────────────────────────────────

    /// Append without deduplicating; dedup happens at count time.
    pub fn ingest_vote(&self, vote: VoteMessage) {
        self.vote_list(vote.round, vote.step).push(Arc::new(vote));
    }

    pub fn vote_iterator(&self, round: u64, step: u64) -> VoteCursor {
        VoteCursor { list: self.vote_list(round, step), index: 0 }
    }

    /// All votes currently stored for `(round, step)`.
    pub fn incoming_votes(&self, round: u64, step: u64) -> Vec<Arc<VoteMessage>> {
        self.votes
            .read()
            .get(&(round, step))
            .map(|list| list.snapshot())
            .unwrap_or_default()
    }

    fn vote_list(&self, round: u64, step: u64) -> Arc<VoteList> {
        if let Some(list) = self.votes.read().get(&(round, step)) {
            return list.clone();
        }
        self.votes
            .write()
            .entry((round, step))
            .or_insert_with(VoteList::new)
            .clone()
    }

    /// Drop everything stored for a finished round. Vote lists only grow,
    /// so once a round is committed the engine garbage-collects it.
    pub fn clear_round(&self, round: u64) {
        self.votes.write().retain(|(r, _), _| *r != round);
        self.clear_proposal(round);
    }

    // ── Inbound dispatch ────────────────────────────────────────────────

    /// Entry point for bytes arriving from the transport. Malformed or
    /// unverifiable messages are dropped; nothing propagates to the
    /// caller.
    pub fn handle(&self, kind: MessageKind, payload: &[u8]) {
        match kind {
            MessageKind::Block => match Block::from_bytes(payload) {
                Ok(block) => self.add_block(block.hash(), block),
                Err(e) => debug!(error = %e, "dropping malformed block"),
            },
            MessageKind::Proposal => {
                if let Err(e) = self.handle_proposal(payload) {
                    debug!(error = %e, "dropping proposal");
                }
            }
            MessageKind::Vote => match VoteMessage::from_bytes(payload) {
                Ok(vote) => self.ingest_vote(vote),
                Err(e) => debug!(error = %e, "dropping malformed vote"),
            },
        }
    }

    fn handle_proposal(&self, payload: &[u8]) -> Result<()> {
        let proposal = Proposal::from_bytes(payload)?;
        if let Some(current) = self.get_max_proposal(proposal.round) {
            if proposal.prior <= current.prior {
                return Ok(());
            }
        }
        let seed = self.chain.sortition_seed(proposal.round, SEED_REFRESH_INTERVAL);
        let role_bytes = role(ROLE_PROPOSER, proposal.round, STEP_PROPOSE);
        let message = seed_role_message(&seed, &role_bytes);
        proposal.verify(self.weight, &message)?;
        self.offer_max_proposal(proposal);
        Ok(())
    }
}

impl Inbound for Peer {
    fn deliver(&self, kind: MessageKind, payload: &[u8]) {
        self.handle(kind, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EXPECTED_PROPOSERS;
    use crate::sortition::{max_priority, sortition};
    use agora_crypto::{sha256, Keypair};

    fn fresh_peer() -> Peer {
        Peer::new(Arc::new(Blockchain::new()))
    }

    fn test_vote(step: u64, tag: u8) -> VoteMessage {
        let kp = Keypair::from_seed([tag; 32]).unwrap();
        let mut vote =
            VoteMessage::new(1, step, vec![tag], vec![tag], sha256(b"parent"), sha256(&[tag]));
        vote.sign(&kp);
        vote
    }

    /// Deterministically search key seeds until one is sortition-selected
    /// as a proposer for round 1 of a fresh chain. Selection probability
    /// per key is ~23%, so the search space makes failure astronomically
    /// unlikely.
    fn selected_proposal(chain: &Blockchain, start_seed: u8) -> Proposal {
        for s in 0..=255u8 {
            let mut seed = [start_seed; 32];
            seed[31] = s;
            let kp = Keypair::from_seed(seed).unwrap();
            let sort_seed = chain.sortition_seed(1, SEED_REFRESH_INTERVAL);
            let role_bytes = role(ROLE_PROPOSER, 1, STEP_PROPOSE);
            let draw =
                sortition(&kp, &sort_seed, &role_bytes, EXPECTED_PROPOSERS, TOKENS_PER_USER)
                    .unwrap();
            if draw.selected() {
                return Proposal {
                    round: 1,
                    hash: sha256(&seed),
                    prior: max_priority(&draw.vrf, draw.sub_users),
                    vrf: draw.vrf,
                    proof: draw.proof,
                    pubkey: kp.public().to_vec(),
                };
            }
        }
        panic!("no proposer selected in 256 deterministic draws");
    }

    #[test]
    fn vote_iterator_sees_later_appends() {
        let peer = fresh_peer();
        peer.ingest_vote(test_vote(2, 1));
        let mut cursor = peer.vote_iterator(1, 2);
        assert!(cursor.next().is_some());
        assert!(cursor.next().is_none());
        peer.ingest_vote(test_vote(2, 2));
        assert!(cursor.next().is_some());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn votes_are_kept_per_round_and_step() {
        let peer = fresh_peer();
        peer.ingest_vote(test_vote(2, 1));
        peer.ingest_vote(test_vote(3, 1));
        assert_eq!(peer.incoming_votes(1, 2).len(), 1);
        assert_eq!(peer.incoming_votes(1, 3).len(), 1);
        assert!(peer.incoming_votes(2, 2).is_empty());
    }

    #[test]
    fn ingest_does_not_deduplicate() {
        let peer = fresh_peer();
        let vote = test_vote(2, 1);
        peer.ingest_vote(vote.clone());
        peer.ingest_vote(vote);
        assert_eq!(peer.incoming_votes(1, 2).len(), 2);
    }

    /// A proposal with the given priority byte; `offer`/`set` do not
    /// verify, so synthetic fields are enough here.
    fn proposal_with_prior(prior: u8) -> Proposal {
        Proposal {
            round: 1,
            hash: sha256(&[prior]),
            prior: vec![prior; 32],
            vrf: vec![prior; 32],
            proof: vec![prior; 80],
            pubkey: vec![prior; 32],
        }
    }

    #[test]
    fn offer_keeps_highest_priority() {
        let peer = fresh_peer();
        let low = proposal_with_prior(1);
        let high = proposal_with_prior(9);
        assert!(peer.offer_max_proposal(low.clone()));
        assert!(peer.offer_max_proposal(high.clone()));
        assert!(!peer.offer_max_proposal(low));
        assert_eq!(peer.get_max_proposal(1).unwrap().prior, high.prior);
    }

    #[test]
    fn set_is_unconditional() {
        let peer = fresh_peer();
        peer.set_max_proposal(1, proposal_with_prior(9));
        peer.set_max_proposal(1, proposal_with_prior(1));
        assert_eq!(peer.get_max_proposal(1).unwrap().prior, vec![1u8; 32]);
        peer.clear_proposal(1);
        assert!(peer.get_max_proposal(1).is_none());
    }

    #[test]
    fn handled_proposals_settle_on_highest_priority_either_order() {
        let chain = Arc::new(Blockchain::new());
        let a = selected_proposal(&chain, 30);
        let b = selected_proposal(&chain, 40);
        assert_ne!(a.prior, b.prior);
        let winner = if a.prior > b.prior { &a } else { &b };

        let forward = Peer::new(chain.clone());
        forward.handle(MessageKind::Proposal, &a.to_bytes().unwrap());
        forward.handle(MessageKind::Proposal, &b.to_bytes().unwrap());
        assert_eq!(forward.get_max_proposal(1).unwrap(), *winner);

        let reverse = Peer::new(chain.clone());
        reverse.handle(MessageKind::Proposal, &b.to_bytes().unwrap());
        reverse.handle(MessageKind::Proposal, &a.to_bytes().unwrap());
        assert_eq!(reverse.get_max_proposal(1).unwrap(), *winner);
    }

    #[test]
    fn unverifiable_proposal_is_dropped() {
        let chain = Arc::new(Blockchain::new());
        let mut proposal = selected_proposal(&chain, 50);
        proposal.prior = sha256(b"forged").to_vec();
        let peer = Peer::new(chain);
        peer.handle(MessageKind::Proposal, &proposal.to_bytes().unwrap());
        assert!(peer.get_max_proposal(1).is_none());
    }

    #[test]
    fn handling_a_block_twice_is_idempotent() {
        let peer = fresh_peer();
        let block = Block::empty(1, sha256(b"parent"));
        let bytes = block.to_bytes().unwrap();
        peer.handle(MessageKind::Block, &bytes);
        let first = peer.get_block(&block.hash()).unwrap();
        peer.handle(MessageKind::Block, &bytes);
        assert_eq!(peer.get_block(&block.hash()).unwrap(), first);
    }

    #[test]
    fn malformed_bytes_are_dropped() {
        let peer = fresh_peer();
        peer.handle(MessageKind::Block, b"not json");
        peer.handle(MessageKind::Proposal, b"not json");
        peer.handle(MessageKind::Vote, b"not json");
        assert!(peer.incoming_votes(0, 0).is_empty());
    }

    #[test]
    fn clear_round_drops_votes_and_proposal() {
        let peer = fresh_peer();
        peer.ingest_vote(test_vote(2, 1));
        peer.offer_max_proposal(proposal_with_prior(5));
        peer.clear_round(1);
        assert!(peer.incoming_votes(1, 2).is_empty());
        assert!(peer.get_max_proposal(1).is_none());
    }
}
