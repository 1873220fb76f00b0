//! Cryptographic sortition.
//!
//! A participant evaluates its VRF on `seed || role` and feeds the
//! 32-byte value into a binomial draw B(weight, expected / total_weight).
//! The sample `j` is the number of *sub-users* the draw grants: zero means
//! not selected, larger values give proportionally more vote weight. The
//! draw is exact rational arithmetic over the binomial CDF: the value is
//! interpreted as `vrf / 2^256` and `j` is the unique bucket with
//! `CDF(j) ≤ ratio < CDF(j+1)`.

use agora_crypto::{sha256_concat, Keypair, PublicKey};
use num_bigint::{BigInt, Sign};
use num_rational::BigRational;
use num_traits::One;

use crate::error::Result;
use crate::params;

/// Outcome of a local sortition draw.
#[derive(Debug, Clone)]
pub struct SortitionDraw {
    /// VRF value over `seed || role`.
    pub vrf: Vec<u8>,
    /// VRF proof for the value.
    pub proof: Vec<u8>,
    /// Vote multiplicity; 0 means not selected.
    pub sub_users: u64,
}

impl SortitionDraw {
    pub fn selected(&self) -> bool {
        self.sub_users > 0
    }
}

/// Role bytes for a sortition draw: `prefix || round_be || step_be`.
pub fn role(prefix: &str, round: u64, step: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + 16);
    out.extend_from_slice(prefix.as_bytes());
    out.extend_from_slice(&round.to_be_bytes());
    out.extend_from_slice(&step.to_be_bytes());
    out
}

/// The VRF input for a draw.
pub fn seed_role_message(seed: &[u8], role: &[u8]) -> Vec<u8> {
    [seed, role].concat()
}

/// Run the local sortition: VRF-evaluate `seed || role` and draw the
/// sub-user count for `weight` stake against `expected` committee seats.
pub fn sortition(
    keypair: &Keypair,
    seed: &[u8],
    role: &[u8],
    expected: u64,
    weight: u64,
) -> Result<SortitionDraw> {
    let message = seed_role_message(seed, role);
    let (vrf, proof) = keypair.evaluate(&message)?;
    let sub_users = sub_users(expected, weight, &vrf);
    Ok(SortitionDraw { vrf, proof, sub_users })
}

/// Verify a peer's draw: check the VRF proof and value, then recompute
/// the sub-user count. Any verification failure yields 0; the voter
/// simply does not count.
pub fn verify_sortition(
    pubkey: &PublicKey,
    vrf: &[u8],
    proof: &[u8],
    seed: &[u8],
    role: &[u8],
    expected: u64,
    weight: u64,
) -> u64 {
    let message = seed_role_message(seed, role);
    match pubkey.verify_vrf(proof, &message) {
        Ok(value) if value.as_slice() == vrf => sub_users(expected, weight, vrf),
        _ => 0,
    }
}

/// Binomial sub-user draw.
///
/// Returns the smallest `j ∈ [0, weight]` with `CDF(j) ≤ ratio < CDF(j+1)`
/// where `ratio = int(vrf) / 2^bitlen(vrf)` and the CDF is the exact
/// binomial B(weight, expected / total_weight); `CDF(weight+1)` is taken
/// as 1. No such bucket (ratio below `CDF(0)`) yields 0.
pub fn sub_users(expected: u64, weight: u64, vrf: &[u8]) -> u64 {
    if expected == 0 || weight == 0 || vrf.is_empty() {
        return 0;
    }
    let total = params::total_tokens();
    if expected >= total {
        return weight;
    }

    let ratio = BigRational::new(
        BigInt::from_bytes_be(Sign::Plus, vrf),
        BigInt::one() << (vrf.len() * 8),
    );
    let p = BigRational::new(BigInt::from(expected), BigInt::from(total));
    let q = BigRational::one() - &p;
    let p_over_q = &p / &q;

    // Walk the CDF incrementally: pmf(j+1) = pmf(j) · (w−j)/(j+1) · p/q.
    // The selected j is tiny in practice, so the loop exits early.
    let mut pmf = rational_pow(&q, weight); // P(X = 0)
    let mut lower = pmf.clone(); // CDF(0)
    for j in 0..=weight {
        let upper = if j == weight {
            BigRational::one()
        } else {
            pmf = &pmf
                * &BigRational::new(BigInt::from(weight - j), BigInt::from(j + 1))
                * &p_over_q;
            &lower + &pmf
        };
        if ratio >= lower && ratio < upper {
            return j;
        }
        lower = upper;
    }
    0
}

/// The proposer's tie-breaker: the lexicographically largest
/// `SHA256(vrf || i_be)` over its sub-users `i = 1..=j`. Empty for j = 0.
pub fn max_priority(vrf: &[u8], sub_users: u64) -> Vec<u8> {
    let mut best: Vec<u8> = Vec::new();
    for i in 1..=sub_users {
        let priority = sha256_concat(&[vrf, &i.to_be_bytes()]);
        if priority.as_slice() > best.as_slice() {
            best = priority.to_vec();
        }
    }
    best
}

/// Exponentiation by squaring; keeps the rational reduced as it goes.
fn rational_pow(base: &BigRational, mut exp: u64) -> BigRational {
    let mut result = BigRational::one();
    let mut base = base.clone();
    while exp > 0 {
        if exp & 1 == 1 {
            result = &result * &base;
        }
        base = &base * &base;
        exp >>= 1;
    }
    result
}
