//! The BA\* engine.
//!
//! One engine instance drives one chain. Per round: propose (sortition,
//! gossip block + priority announcement), wait out the priority window,
//! adopt the best proposal, reduce the choice to one hash or the empty
//! hash, settle it in binary agreement with a common-coin escape, tally
//! the FINAL step independently, and commit the result back to the chain
//! record. Every waiting step is bounded by a protocol timer; the engine
//! never blocks holding a store lock.
//!
//! The data and table chains run two independent engine instances; they
//! share nothing but the node keypair and the outbound gossip handle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use agora_core::{Address, Block, Blockchain, ConsensusKind, Hash};
use agora_crypto::{sha256_concat, Keypair, PublicKey};
use num_bigint::BigUint;
use num_traits::One;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{ConsensusError, Result};
use crate::gossip::{ChainTag, Gossip, MessageKind};
use crate::message::{Proposal, VoteMessage};
use crate::params::{
    BA_STEP_THRESHOLD, BLOCK_POLL_INTERVAL, EXPECTED_COMMITTEE, EXPECTED_FINAL_COMMITTEE,
    EXPECTED_PROPOSERS, FINAL_THRESHOLD, LAMBDA_BLOCK, LAMBDA_PRIORITY, LAMBDA_STEP,
    LAMBDA_STEPVAR, MAX_STEPS, ROLE_COMMITTEE, ROLE_PROPOSER, SEED_REFRESH_INTERVAL,
    STEP_FINAL, STEP_PROPOSE, STEP_REDUCTION_ONE, STEP_REDUCTION_TWO, TOKENS_PER_USER,
    VOTE_POLL_INTERVAL,
};
use crate::peer::Peer;
use crate::seed::vrf_seed;
use crate::sortition::{max_priority, role, sortition, verify_sortition};

/// What the application chain hands the engine for the next round.
#[derive(Debug, Clone)]
pub struct PayloadDescriptor {
    /// Opaque payload, typically the hash of an application block.
    pub payload_hash: Vec<u8>,
    /// The application's idea of the round it is feeding; logged when it
    /// disagrees with the consensus round.
    pub round_hint: u64,
}

/// A vote that passed signature, parent and sortition checks.
struct CheckedVote {
    multiplicity: u64,
    hash: Hash,
    vrf: Vec<u8>,
    voter: PublicKey,
}

pub struct Engine {
    tag: ChainTag,
    keypair: Arc<Keypair>,
    chain: Arc<Blockchain>,
    peer: Arc<Peer>,
    gossip: Arc<dyn Gossip>,
    weight: u64,
}

impl Engine {
    pub fn new(
        tag: ChainTag,
        keypair: Arc<Keypair>,
        chain: Arc<Blockchain>,
        peer: Arc<Peer>,
        gossip: Arc<dyn Gossip>,
    ) -> Self {
        Self { tag, keypair, chain, peer, gossip, weight: TOKENS_PER_USER }
    }

    pub fn tag(&self) -> ChainTag {
        self.tag
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    fn last(&self) -> Block {
        self.chain.last()
    }

    /// Run rounds until the input queue closes. Only a fatal error stops
    /// the loop early; every normal round commits *some* block.
    pub async fn run(
        &self,
        mut input: mpsc::Receiver<PayloadDescriptor>,
        output: mpsc::Sender<Block>,
    ) -> Result<()> {
        while let Some(payload) = input.recv().await {
            let block = self.run_round(&payload).await?;
            if output.send(block).await.is_err() {
                debug!(chain = %self.tag, "output channel closed, stopping engine");
                break;
            }
        }
        Ok(())
    }

    /// Drive a single round to a committed block.
    pub async fn run_round(&self, payload: &PayloadDescriptor) -> Result<Block> {
        let round = self.last().round + 1;
        if payload.round_hint != round {
            debug!(chain = %self.tag, round, hint = payload.round_hint, "payload round hint differs");
        }
        info!(chain = %self.tag, round, "starting round");

        let candidate = self.block_proposal(payload).await;
        info!(
            chain = %self.tag,
            round,
            hash = %hex::encode(candidate.hash()),
            empty = candidate.is_empty(),
            "entering agreement"
        );

        let (kind, block) = self.ba(round, &candidate).await?;
        info!(
            chain = %self.tag,
            round,
            kind = ?kind,
            hash = %hex::encode(block.hash()),
            empty = block.is_empty(),
            "reached consensus"
        );

        self.chain.add(block.clone());
        self.peer.clear_round(round);
        Ok(block)
    }

    // ── Proposal ────────────────────────────────────────────────────────

    /// Build and sign a candidate block for `round` carrying the payload.
    fn propose_block(
        &self,
        round: u64,
        last: &Block,
        payload: &PayloadDescriptor,
        author_vrf: &[u8],
        author_proof: &[u8],
    ) -> Block {
        let (seed, proof) = match vrf_seed(&self.chain, &self.keypair, round) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(chain = %self.tag, round, error = %e, "seed evaluation failed, proposing empty block");
                return Block::empty(round, last.hash());
            }
        };
        let mut block = Block {
            round,
            parent_hash: last.hash(),
            author: Address::from_slice(self.keypair.public().as_bytes()),
            author_vrf: author_vrf.to_vec(),
            author_proof: author_proof.to_vec(),
            time: unix_now(),
            seed,
            proof,
            data: payload.payload_hash.clone(),
            kind: ConsensusKind::Tentative,
            signature: Vec::new(),
        };
        block.sign(&self.keypair);
        debug!(chain = %self.tag, round, hash = %hex::encode(block.hash()), "proposing new block");
        block
    }

    /// The proposal phase: run proposer sortition and gossip a candidate
    /// when selected, wait out the priority window, then adopt the
    /// highest-priority proposal whose block has arrived, or the empty
    /// block on timeout.
    pub async fn block_proposal(&self, payload: &PayloadDescriptor) -> Block {
        let last = self.last();
        let round = last.round + 1;
        let seed = self.chain.sortition_seed(round, SEED_REFRESH_INTERVAL);
        let role_bytes = role(ROLE_PROPOSER, round, STEP_PROPOSE);

        match sortition(&self.keypair, &seed, &role_bytes, EXPECTED_PROPOSERS, self.weight) {
            Ok(draw) if draw.selected() => {
                info!(chain = %self.tag, round, sub_users = draw.sub_users, "selected as proposer");
                let block = self.propose_block(round, &last, payload, &draw.vrf, &draw.proof);
                let proposal = Proposal {
                    round,
                    hash: block.hash(),
                    prior: max_priority(&draw.vrf, draw.sub_users),
                    vrf: draw.vrf,
                    proof: draw.proof,
                    pubkey: self.keypair.public().to_vec(),
                };
                self.peer.add_block(block.hash(), block.clone());
                self.peer.offer_max_proposal(proposal.clone());
                match (block.to_bytes(), proposal.to_bytes()) {
                    (Ok(block_bytes), Ok(proposal_bytes)) => {
                        self.gossip.gossip(self.tag, MessageKind::Block, block_bytes);
                        self.gossip.gossip(self.tag, MessageKind::Proposal, proposal_bytes);
                    }
                    _ => warn!(chain = %self.tag, round, "failed to encode own proposal"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(chain = %self.tag, round, error = %e, "proposer sortition failed"),
        }

        // Let sortition proofs propagate before picking a winner.
        sleep(LAMBDA_STEPVAR + LAMBDA_PRIORITY).await;

        // Poll for the winning block until the proposal window closes.
        let deadline = sleep(LAMBDA_BLOCK);
        tokio::pin!(deadline);
        let mut ticker = interval(BLOCK_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!(chain = %self.tag, round, "no proposal block arrived in time");
                    return Block::empty(round, last.hash());
                }
                _ = ticker.tick() => {
                    if let Some(proposal) = self.peer.get_max_proposal(round) {
                        if let Some(block) = self.peer.get_block(&proposal.hash) {
                            return block;
                        }
                    }
                }
            }
        }
    }

    // ── Agreement ───────────────────────────────────────────────────────

    /// BA\*: reduce the candidate to one hash, settle it in binary
    /// agreement, and tag the result Final or Tentative depending on the
    /// independent FINAL-step tally.
    pub async fn ba(&self, round: u64, candidate: &Block) -> Result<(ConsensusKind, Block)> {
        let reduced = self.reduction(round, candidate.hash()).await;
        let agreed = self.binary_ba(round, reduced).await?;
        let final_tally = self
            .count_votes(round, STEP_FINAL, FINAL_THRESHOLD, EXPECTED_FINAL_COMMITTEE, LAMBDA_STEP)
            .await;

        let prev_hash = self.last().hash();
        let mut block = if agreed == Block::empty_hash(round, &prev_hash) {
            Block::empty(round, prev_hash)
        } else {
            match self.peer.get_block(&agreed) {
                Some(block) => block,
                None => {
                    warn!(chain = %self.tag, round, hash = %hex::encode(agreed), "agreed block missing from store, committing empty");
                    Block::empty(round, prev_hash)
                }
            }
        };

        let kind = match final_tally {
            Ok(final_hash) if final_hash == agreed => ConsensusKind::Final,
            _ => ConsensusKind::Tentative,
        };
        block.kind = kind;
        Ok((kind, block))
    }

    /// Two voting sub-steps narrowing the round to a single hash. Either
    /// sub-step timing out steers the round towards the empty hash.
    pub async fn reduction(&self, round: u64, hash: Hash) -> Hash {
        self.committee_vote(round, STEP_REDUCTION_ONE, EXPECTED_COMMITTEE, hash);
        let first = self
            .count_votes(
                round,
                STEP_REDUCTION_ONE,
                BA_STEP_THRESHOLD,
                EXPECTED_COMMITTEE,
                // Others may still be waiting for the proposal block.
                LAMBDA_BLOCK + LAMBDA_STEP,
            )
            .await;

        let empty = Block::empty_hash(round, &self.last().hash());
        match first {
            Ok(winner) => self.committee_vote(round, STEP_REDUCTION_TWO, EXPECTED_COMMITTEE, winner),
            Err(_) => self.committee_vote(round, STEP_REDUCTION_TWO, EXPECTED_COMMITTEE, empty),
        }

        self.count_votes(round, STEP_REDUCTION_TWO, BA_STEP_THRESHOLD, EXPECTED_COMMITTEE, LAMBDA_STEP)
            .await
            .unwrap_or(empty)
    }

    /// Binary agreement on `hash_in` versus the empty hash. Exhausting
    /// the step budget is fatal: the protocol has failed for this chain.
    pub async fn binary_ba(&self, round: u64, hash_in: Hash) -> Result<Hash> {
        let empty = Block::empty_hash(round, &self.last().hash());
        let mut r = hash_in;
        let mut step: u64 = 1;

        while step <= MAX_STEPS {
            // Sub-round A: a timeout keeps the reduction choice alive; a
            // non-empty super-majority settles the round.
            self.committee_vote(round, step, EXPECTED_COMMITTEE, r);
            match self
                .count_votes(round, step, BA_STEP_THRESHOLD, EXPECTED_COMMITTEE, LAMBDA_STEP)
                .await
            {
                Err(_) => r = hash_in,
                Ok(counted) => {
                    r = counted;
                    if r != empty {
                        for s in step + 1..=step + 3 {
                            self.committee_vote(round, s, EXPECTED_COMMITTEE, r);
                        }
                        if step == 1 {
                            self.committee_vote(round, STEP_FINAL, EXPECTED_FINAL_COMMITTEE, r);
                        }
                        debug!(chain = %self.tag, round, step, "binary agreement settled on block");
                        return Ok(r);
                    }
                }
            }

            // Sub-round B: the mirror image, tilted towards empty.
            self.committee_vote(round, step + 1, EXPECTED_COMMITTEE, r);
            match self
                .count_votes(round, step + 1, BA_STEP_THRESHOLD, EXPECTED_COMMITTEE, LAMBDA_STEP)
                .await
            {
                Err(_) => r = empty,
                Ok(counted) => {
                    r = counted;
                    if r == empty {
                        for s in step + 2..=step + 4 {
                            self.committee_vote(round, s, EXPECTED_COMMITTEE, r);
                        }
                        debug!(chain = %self.tag, round, step = step + 1, "binary agreement settled on empty");
                        return Ok(r);
                    }
                }
            }

            // Sub-round C: on a split with no majority, the common coin
            // keeps an adversary from stalling the loop forever.
            self.committee_vote(round, step + 2, EXPECTED_COMMITTEE, r);
            match self
                .count_votes(round, step + 2, BA_STEP_THRESHOLD, EXPECTED_COMMITTEE, LAMBDA_STEP)
                .await
            {
                Err(_) => {
                    r = if self.common_coin(round, step + 2, EXPECTED_COMMITTEE) == 0 {
                        hash_in
                    } else {
                        empty
                    };
                }
                Ok(counted) => r = counted,
            }

            step += 3;
        }

        error!(chain = %self.tag, round, max_steps = MAX_STEPS, "binary agreement exhausted its step budget");
        Err(ConsensusError::MaxStepsExhausted(MAX_STEPS))
    }

    // ── Voting ──────────────────────────────────────────────────────────

    /// Run committee sortition for `(round, step)` and, when selected,
    /// sign and gossip a vote for `hash`. A node never delivers its own
    /// votes to itself.
    pub fn committee_vote(&self, round: u64, step: u64, expected: u64, hash: Hash) {
        let seed = self.chain.sortition_seed(round, SEED_REFRESH_INTERVAL);
        let role_bytes = role(ROLE_COMMITTEE, round, step);
        let draw = match sortition(&self.keypair, &seed, &role_bytes, expected, self.weight) {
            Ok(draw) => draw,
            Err(e) => {
                warn!(chain = %self.tag, round, step, error = %e, "committee sortition failed");
                return;
            }
        };
        if !draw.selected() {
            return;
        }
        let mut vote =
            VoteMessage::new(round, step, draw.vrf, draw.proof, self.last().hash(), hash);
        vote.sign(&self.keypair);
        match vote.to_bytes() {
            Ok(bytes) => self.gossip.gossip(self.tag, MessageKind::Vote, bytes),
            Err(e) => warn!(chain = %self.tag, round, step, error = %e, "failed to encode own vote"),
        }
    }

    /// Tally votes for `(round, step)` until some hash reaches
    /// `⌈expected × threshold⌉` weighted votes or the timer expires.
    /// Each voter key contributes once, at first arrival.
    pub async fn count_votes(
        &self,
        round: u64,
        step: u64,
        threshold: f64,
        expected: u64,
        timeout: std::time::Duration,
    ) -> Result<Hash> {
        let deadline = Instant::now() + timeout;
        let needed = ((expected as f64) * threshold).ceil() as u64;
        let mut counts: HashMap<Hash, u64> = HashMap::new();
        let mut voters: HashSet<[u8; 32]> = HashSet::new();
        let mut cursor = self.peer.vote_iterator(round, step);

        loop {
            match cursor.next() {
                None => {
                    if Instant::now() >= deadline {
                        return Err(ConsensusError::CountVotesTimeout);
                    }
                    sleep(VOTE_POLL_INTERVAL).await;
                }
                Some(vote) => {
                    let Some(checked) = self.process_vote(&vote, expected) else {
                        continue;
                    };
                    if checked.multiplicity == 0 || !voters.insert(*checked.voter.as_bytes()) {
                        continue;
                    }
                    let tally = counts.entry(checked.hash).or_insert(0);
                    *tally += checked.multiplicity;
                    if *tally >= needed {
                        return Ok(checked.hash);
                    }
                }
            }
        }
    }

    /// Validate one incoming vote: signature, parent linkage, sortition.
    /// Returns `None` when the vote must be dropped outright; a valid but
    /// unselected voter comes back with multiplicity 0.
    fn process_vote(&self, vote: &VoteMessage, expected: u64) -> Option<CheckedVote> {
        let voter = vote.verify_signature().ok()?;
        // Discard votes that do not extend this chain.
        if vote.parent_hash != self.last().hash() {
            return None;
        }
        let seed = self.chain.sortition_seed(vote.round, SEED_REFRESH_INTERVAL);
        let role_bytes = role(ROLE_COMMITTEE, vote.round, vote.step);
        let multiplicity = verify_sortition(
            &voter,
            &vote.vrf,
            &vote.proof,
            &seed,
            &role_bytes,
            expected,
            self.weight,
        );
        Some(CheckedVote { multiplicity, hash: vote.hash, vrf: vote.vrf.clone(), voter })
    }

    /// The shared recovery coin: the parity of the minimum
    /// `SHA256(vrf || i)` over every valid vote's sub-users at
    /// `(round, step)`.
    pub fn common_coin(&self, round: u64, step: u64, expected: u64) -> u8 {
        let mut min = BigUint::one() << 256usize;
        for vote in self.peer.incoming_votes(round, step) {
            let Some(checked) = self.process_vote(&vote, expected) else {
                continue;
            };
            for i in 1..checked.multiplicity {
                let h = BigUint::from_bytes_be(&sha256_concat(&[&checked.vrf, &i.to_be_bytes()]));
                if h < min {
                    min = h;
                }
            }
        }
        u8::from(min.bit(0))
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
