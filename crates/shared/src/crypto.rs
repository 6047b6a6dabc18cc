//! Hashing utilities for deterministic rollout bucketing.
//!
//! The bucket contract is fixed: SHA-1 over the UTF-8 seed, the leading
//! 32 bits (first 8 hex digits) of the digest read as a big-endian unsigned
//! integer, modulo 100. Other services that need to agree on cohorts must
//! use the same recipe.

use sha1::{Digest, Sha1};

/// Number of rollout buckets.
pub const BUCKET_COUNT: u32 = 100;

/// Leading 32 bits of the SHA-1 digest of `seed`, big-endian.
pub fn leading_u32(seed: &str) -> u32 {
    let digest = Sha1::digest(seed.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Maps a seed to a bucket in `0..100`.
pub fn stable_bucket(seed: &str) -> u32 {
    leading_u32(seed) % BUCKET_COUNT
}

/// Builds the rollout seed `"<flag_key>:<identity>"`.
pub fn rollout_seed(flag_key: &str, identity: &str) -> String {
    format!("{}:{}", flag_key, identity)
}
