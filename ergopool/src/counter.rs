//! Monotonic generators for job ids, nonce prefixes, and subscription ids.
//!
//! All three counters are shared across connection tasks and the polling
//! task, so every increment goes through an atomic. Handing out a duplicate
//! extra-nonce prefix would let two miners grind the same nonce space;
//! handing out a duplicate job id would corrupt stale-share detection.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Full nonce width in bytes: `extraNonce1 ‖ extraNonce2` must always
/// concatenate to exactly this many bytes.
pub const NONCE_BYTES: usize = 8;

/// Widest allowed pool-assigned nonce prefix.
pub const MAX_EXTRA_NONCE1_SIZE: usize = 4;

/// Monotonic job-id generator.
///
/// Ids are lowercase hex and unique for the process lifetime; wrap-around at
/// `u64::MAX` is not handled specially.
#[derive(Debug, Default)]
pub struct JobCounter {
    next: AtomicU64,
}

impl JobCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        format!("{:x}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-connection nonce-prefix allocator.
///
/// Each subscribing miner gets the next `size` bytes of a shared 32-bit
/// counter as its extra-nonce1. The counter is randomly seeded (with the low
/// 27 bits clear) so prefixes differ across server restarts. Miners then own
/// the remaining `NONCE_BYTES - size` bytes as extra-nonce2.
#[derive(Debug)]
pub struct ExtraNonceCounter {
    counter: AtomicU32,
    size: usize,
}

impl ExtraNonceCounter {
    /// Create an allocator handing out `size`-byte prefixes.
    ///
    /// `size` outside 1..=4 leaves no room for either nonce segment and is
    /// rejected.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || size > MAX_EXTRA_NONCE1_SIZE {
            return Err(Error::Config(format!(
                "extraNonce1 size must be 1 to {MAX_EXTRA_NONCE1_SIZE} bytes, got {size}"
            )));
        }
        Ok(Self {
            counter: AtomicU32::new(rand::random::<u32>() << 27),
            size,
        })
    }

    /// Allocate the next prefix.
    pub fn next(&self) -> Vec<u8> {
        let value = self.counter.fetch_add(1, Ordering::Relaxed);
        value.to_be_bytes()[MAX_EXTRA_NONCE1_SIZE - self.size..].to_vec()
    }

    /// Prefix width in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// How many bytes of extra-nonce2 miners must supply.
    pub fn extra_nonce2_size(&self) -> usize {
        NONCE_BYTES - self.size
    }
}

/// Session-id generator for subscribe responses.
///
/// Ids are a fixed recognizable prefix followed by a little-endian counter
/// in hex. The counter starts at 1 and skips 0 on wrap-around.
#[derive(Debug)]
pub struct SubscriptionIdCounter {
    next: AtomicU64,
}

impl SubscriptionIdCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let mut value = self.next.fetch_add(1, Ordering::Relaxed);
        if value == 0 {
            value = self.next.fetch_add(1, Ordering::Relaxed);
        }
        format!("deadbeefcafebabe{}", hex::encode(value.to_le_bytes()))
    }
}

impl Default for SubscriptionIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_job_ids_are_sequential_hex() {
        let counter = JobCounter::new();
        assert_eq!(counter.next_id(), "0");
        assert_eq!(counter.next_id(), "1");
        for _ in 0..13 {
            counter.next_id();
        }
        assert_eq!(counter.next_id(), "f");
        assert_eq!(counter.next_id(), "10");
    }

    #[test_case(0; "zero width")]
    #[test_case(5; "too wide")]
    fn test_extra_nonce_rejects_bad_width(size: usize) {
        assert!(ExtraNonceCounter::new(size).is_err());
    }

    #[test_case(1, 7)]
    #[test_case(2, 6)]
    #[test_case(3, 5)]
    #[test_case(4, 4)]
    fn test_extra_nonce_widths(size: usize, expected_en2: usize) {
        let counter = ExtraNonceCounter::new(size).unwrap();
        assert_eq!(counter.extra_nonce2_size(), expected_en2);
        let prefix = counter.next();
        assert_eq!(prefix.len(), size);
        assert_eq!(hex::encode(&prefix).len(), 2 * size);
    }

    #[test]
    fn test_extra_nonce_prefixes_are_distinct() {
        let counter = ExtraNonceCounter::new(4).unwrap();
        let a = counter.next();
        let b = counter.next();
        let c = counter.next();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_subscription_ids() {
        let counter = SubscriptionIdCounter::new();
        let first = counter.next_id();
        let second = counter.next_id();
        assert!(first.starts_with("deadbeefcafebabe"));
        assert_eq!(first.len(), 32);
        assert_eq!(&first[16..], "0100000000000000");
        assert_eq!(&second[16..], "0200000000000000");
    }
}
