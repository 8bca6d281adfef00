//! Human-readable rendering of error-state bitmasks.
//!
//! A mask is written as the comma-joined positions of its set bits, highest
//! bit first: `0b1010` renders as `"3,1"` and `0` renders as an empty string.

use crate::error::VeritasError;
use crate::Result;

/// Renders a mask as its set bit positions, highest first.
///
/// # Errors
/// Masks with bits at or above `highest_bit` are an `InvariantViolation`.
pub fn bitmask_to_positions(mask: u64, highest_bit: u32) -> Result<String> {
    if highest_bit < u64::BITS && mask >> highest_bit != 0 {
        return Err(VeritasError::invariant(format!(
            "Error state {} has bits beyond the highest registered bit {}",
            mask, highest_bit
        )));
    }
    let positions: Vec<String> = (0..highest_bit.min(u64::BITS))
        .rev()
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| bit.to_string())
        .collect();
    Ok(positions.join(","))
}

/// Parses a rendered position list back into a mask.
///
/// # Errors
/// Returns a `Validation` error for entries that are not bit positions.
pub fn positions_to_bitmask(positions: &str) -> Result<u64> {
    positions
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .try_fold(0u64, |mask, position| {
            let bit: u32 = position.parse().map_err(|_| {
                VeritasError::validation(format!("'{}' is not a bit position", position))
            })?;
            let value = 1u64.checked_shl(bit).ok_or_else(|| {
                VeritasError::validation(format!("Bit position {} is out of range", bit))
            })?;
            Ok(mask | value)
        })
}
