//! Proof-of-work support.
//!
//! The share adjudicator only needs two things from the PoW layer: the
//! height-dependent table size `N` and a hit value for a candidate/nonce
//! pair. The hit computation sits behind [`HitProvider`] so lifecycle and
//! classification logic can be tested with cheap stand-ins, while the
//! production implementation lives in [`autolykos2`].

mod autolykos2;

pub use autolykos2::Autolykos2;

use crate::u256::U256;

/// Base table size below the growth schedule, `2^26`.
pub const N_BASE: u64 = 1 << 26;

/// Height at which the table-size schedule starts stepping.
const INCREASE_START: u64 = 600 * 1024;

/// Blocks between steps of the schedule.
const INCREASE_PERIOD: u64 = 50 * 1024;

/// Heights at or past this use the fixed final table size.
const INCREASE_HEIGHT_MAX: u64 = 9_216_000;

/// Table size at and beyond [`INCREASE_HEIGHT_MAX`].
const N_AT_HEIGHT_MAX: u64 = 2_147_387_550;

/// Table size `N` for a given block height.
///
/// Heights are clamped to [`INCREASE_HEIGHT_MAX`]. Below the schedule start
/// the size is the base constant; past the clamp it is the fixed final
/// value; in between the base is floor-divided by `100 * 105` once per
/// elapsed period (counting the period containing `height` itself). Hit
/// values depend on this schedule byte-for-byte, so the constants and the
/// integer division must not be altered.
pub fn memory_size(height: u64) -> u64 {
    let height = height.min(INCREASE_HEIGHT_MAX);
    if height < INCREASE_START {
        return N_BASE;
    }
    if height >= INCREASE_HEIGHT_MAX {
        return N_AT_HEIGHT_MAX;
    }
    let iterations = (height - INCREASE_START) / INCREASE_PERIOD + 1;
    let mut n = N_BASE;
    for _ in 0..iterations {
        n /= 100 * 105;
    }
    n
}

/// Hit evaluation for a solution attempt.
///
/// Implementations must be pure: the same inputs always produce the same
/// hit. `n` is the table size from [`memory_size`] and must be nonzero.
pub trait HitProvider: Send + Sync {
    fn hit(&self, msg: &[u8], nonce: &[u8], height: u64, n: u64) -> U256;
}
