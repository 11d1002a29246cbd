//! Autolykos v2 hit computation.
//!
//! Recomputes the hit value miners claim, from scratch, using Blake2b-256:
//!
//! 1. Derive a table row `i` from the candidate message and nonce.
//! 2. Hash row `i` with the height bytes and the fixed constant table `M`
//!    to seed the index generator.
//! 3. Derive 32 further row indexes, hash each the same way, and sum the
//!    resulting 31-byte integers.
//! 4. The hit is the Blake2b-256 digest of that sum, read as a big-endian
//!    256-bit integer.
//!
//! Lower hits are better: at or below the network target the solution is a
//! block, at or above the pool target it is not even a share.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use super::HitProvider;
use crate::u256::U256;

type Blake2b256 = Blake2b<U32>;

/// Number of 8-byte entries in the constant table `M`.
const M_TABLE_LONGS: u64 = 1024;

/// Autolykos v2 hit provider.
///
/// Construction materializes the 8 KiB constant table once; evaluation is
/// pure CPU work with no allocation beyond the digest states.
pub struct Autolykos2 {
    m: Vec<u8>,
}

impl Autolykos2 {
    pub fn new() -> Self {
        let mut m = Vec::with_capacity((M_TABLE_LONGS * 8) as usize);
        for i in 0..M_TABLE_LONGS {
            m.extend_from_slice(&i.to_be_bytes());
        }
        Self { m }
    }
}

impl Default for Autolykos2 {
    fn default() -> Self {
        Self::new()
    }
}

impl HitProvider for Autolykos2 {
    fn hit(&self, msg: &[u8], nonce: &[u8], height: u64, n: u64) -> U256 {
        debug_assert!(n > 0, "table size must be nonzero");
        let height_bytes = (height as u32).to_be_bytes();

        // First row index comes from the last 8 digest bytes of msg ‖ nonce.
        let pre = blake2b256(&[msg, nonce]);
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&pre[24..]);
        let first_row = ((u64::from_be_bytes(tail) % n) as u32).to_be_bytes();

        let f = blake2b256(&[&first_row, &height_bytes, &self.m]);

        // The index seed drops the first digest byte, like every other
        // 31-byte integer in this scheme.
        let indexes = generate_indexes(&[&f[1..], msg, nonce], n);

        let mut sum = U256::ZERO;
        for index in indexes {
            let row = blake2b256(&[&index.to_be_bytes(), &height_bytes, &self.m]);
            sum += U256::from_be_slice(&row[1..]);
        }

        U256::from_be_bytes(blake2b256(&[&sum.to_be_bytes()]))
    }
}

/// Hash the concatenation of `parts`.
fn blake2b256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Derive 32 table row indexes, each in `0..n`.
///
/// The seed digest is extended with its own first 3 bytes, then read as 32
/// overlapping big-endian u32 words at byte offsets 0 through 31.
fn generate_indexes(seed_parts: &[&[u8]], n: u64) -> [u32; 32] {
    let hash = blake2b256(seed_parts);
    let mut extended = [0u8; 35];
    extended[..32].copy_from_slice(&hash);
    extended[32..].copy_from_slice(&hash[..3]);

    let mut indexes = [0u32; 32];
    for (i, index) in indexes.iter_mut().enumerate() {
        let word = u32::from_be_bytes([
            extended[i],
            extended[i + 1],
            extended[i + 2],
            extended[i + 3],
        ]);
        *index = (u64::from(word) % n) as u32;
    }
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::memory_size;

    fn provider() -> Autolykos2 {
        Autolykos2::new()
    }

    #[test]
    fn test_m_table_layout() {
        let pow = provider();
        assert_eq!(pow.m.len(), 8192);
        assert_eq!(&pow.m[..8], &[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&pow.m[8..16], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&pow.m[8184..], &[0, 0, 0, 0, 0, 0, 3, 255]);
    }

    #[test]
    fn test_hit_is_deterministic() {
        let pow = provider();
        let msg = b"candidate message";
        let nonce = [7u8; 8];
        let n = memory_size(600_000);

        let a = pow.hit(msg, &nonce, 600_000, n);
        let b = pow.hit(msg, &nonce, 600_000, n);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hit_depends_on_every_input() {
        let pow = provider();
        let msg = b"candidate message";
        let nonce = [7u8; 8];
        let n = memory_size(100);

        let base = pow.hit(msg, &nonce, 100, n);
        assert_ne!(pow.hit(b"other message", &nonce, 100, n), base);
        assert_ne!(pow.hit(msg, &[8u8; 8], 100, n), base);
        assert_ne!(pow.hit(msg, &nonce, 101, n), base);
    }

    #[test]
    fn test_generated_indexes_stay_in_range() {
        let n = 6391;
        let indexes = generate_indexes(&[b"seed material", b"more"], n);
        assert!(indexes.iter().all(|&i| u64::from(i) < n));

        // A tiny n exercises the modulo on every word.
        let indexes = generate_indexes(&[b"seed material"], 3);
        assert!(indexes.iter().all(|&i| i < 3));
    }

    #[test]
    fn test_indexes_are_deterministic() {
        let a = generate_indexes(&[b"abc", b"def"], 1000);
        let b = generate_indexes(&[b"abc", b"def"], 1000);
        let c = generate_indexes(&[b"abc", b"xyz"], 1000);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
