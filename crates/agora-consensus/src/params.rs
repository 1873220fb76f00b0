//! Protocol parameters. All fixed at build time: membership is static and
//! every participant carries the same stake.

use std::time::Duration;

/// Target proposer committee size.
pub const EXPECTED_PROPOSERS: u64 = 26;
/// Target BA step committee size.
pub const EXPECTED_COMMITTEE: u64 = 10;
/// Target final-step committee size.
pub const EXPECTED_FINAL_COMMITTEE: u64 = 20;

/// Super-majority fraction for BA steps.
pub const BA_STEP_THRESHOLD: f64 = 0.685;
/// Super-majority fraction for the final tally.
pub const FINAL_THRESHOLD: f64 = 0.67;

/// Maximum BinaryBA step budget. Deliberately small; a deployment would
/// raise this (e.g. 150); exhaustion is a fatal error either way.
pub const MAX_STEPS: u64 = 3;

/// Seed refresh interval in rounds. Committee selection for round r uses
/// the seed of round `r − 1 − ((r−1) mod R)`, frustrating last-moment
/// seed grinding.
pub const SEED_REFRESH_INTERVAL: u64 = 1000;

/// Time to gossip sortition proofs.
pub const LAMBDA_PRIORITY: Duration = Duration::from_secs(2);
/// Timeout for receiving a proposed block.
pub const LAMBDA_BLOCK: Duration = Duration::from_secs(2);
/// BA step timeout.
pub const LAMBDA_STEP: Duration = Duration::from_secs(2);
/// Estimated variance of BA completion times.
pub const LAMBDA_STEPVAR: Duration = Duration::from_secs(2);

/// Fixed stake per participant.
pub const TOKENS_PER_USER: u64 = 10_000;
/// Fixed cluster membership.
pub const USER_COUNT: u64 = 100;

pub fn total_tokens() -> u64 {
    USER_COUNT * TOKENS_PER_USER
}

/// Sortition role prefixes.
pub const ROLE_PROPOSER: &str = "proposer";
pub const ROLE_COMMITTEE: &str = "Committee";

/// Protocol step numbers. BinaryBA iterations use `1..=MAX_STEPS`; the
/// named phases sit above that range.
pub const STEP_PROPOSE: u64 = 1000;
pub const STEP_REDUCTION_ONE: u64 = 1001;
pub const STEP_REDUCTION_TWO: u64 = 1002;
pub const STEP_FINAL: u64 = 1003;

/// Poll cadence while waiting for the highest-priority proposal block.
pub const BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Poll cadence while draining the vote cursor in a tally.
pub const VOTE_POLL_INTERVAL: Duration = Duration::from_millis(10);
