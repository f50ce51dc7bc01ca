//! Validation of Unix timestamps embedded in transient values.

use crate::error::CryptoError;

/// Accepted clock difference, in seconds, in either direction.
pub const DEFAULT_LEEWAY_SECONDS: i64 = 5 * 60;

/// Checks that `raw` is a Unix timestamp within the leeway of `now`.
///
/// # Errors
///
/// Returns `InvalidTimestamp` if `raw` is not an integer, `ExpiredTimestamp`
/// if it is older than the leeway, and `FutureTimestamp` if it is ahead of
/// `now` by more than the leeway.
pub fn validate_timestamp(raw: &str, now: i64) -> Result<(), CryptoError> {
    let issued: i64 = raw.parse().map_err(|e: std::num::ParseIntError| {
        CryptoError::InvalidTimestamp {
            reason: e.to_string(),
        }
    })?;

    let age = now.saturating_sub(issued);
    if age > DEFAULT_LEEWAY_SECONDS {
        return Err(CryptoError::ExpiredTimestamp);
    }
    if age < -DEFAULT_LEEWAY_SECONDS {
        return Err(CryptoError::FutureTimestamp);
    }
    Ok(())
}
