//! Unbiased bounded random outcomes from the OS entropy source.
//!
//! Draws are 32-bit and reduced with rejection sampling, so every value in
//! `[0, n)` is exactly equally likely. No non-cryptographic generator is used.

use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Number of badge classes a mystery box can yield.
pub const BADGE_CLASSES: i64 = 5;

const RANGE: u64 = 1 << 32;

/// A source of uniformly random 32-bit words.
pub trait EntropySource {
    fn next_u32(&mut self) -> Result<u32>;
}

/// Operating-system CSPRNG via `getrandom`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn next_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        getrandom::getrandom(&mut buf).map_err(|e| CoreError::Entropy(e.to_string()))?;
        Ok(u32::from_le_bytes(buf))
    }
}

/// Pick a uniformly distributed integer in `[0, max_exclusive)`.
///
/// # Errors
/// `InvalidArgument` if `max_exclusive <= 0` or larger than `2^32`.
pub fn pick(max_exclusive: i64) -> Result<u32> {
    pick_with(&mut OsEntropy, max_exclusive)
}

/// Same as [`pick`] with an explicit entropy source.
pub fn pick_with<E: EntropySource + ?Sized>(entropy: &mut E, max_exclusive: i64) -> Result<u32> {
    if max_exclusive <= 0 {
        return Err(CoreError::InvalidArgument(
            "maxExclusive must be > 0".to_string(),
        ));
    }
    let n = max_exclusive as u64;
    if n > RANGE {
        return Err(CoreError::InvalidArgument(format!(
            "maxExclusive must be <= {RANGE}, got {max_exclusive}"
        )));
    }

    let limit = RANGE - (RANGE % n);
    loop {
        let draw = entropy.next_u32()? as u64;
        if draw < limit {
            return Ok((draw % n) as u32);
        }
    }
}

/// Fresh random identifier used to correlate one logical action across
/// retries and offline replay.
pub fn new_correlation_id() -> Uuid {
    Uuid::new_v4()
}
