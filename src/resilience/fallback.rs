//! # Fallback Combinator
//!
//! Runs a primary operation and, on failure, a secondary one (cached data,
//! a degraded response, an alternate backend). The primary failure is logged
//! and then swallowed; the caller sees only the fallback's outcome.

use std::future::Future;
use tracing::warn;

/// Run `primary`; on error, log it and run `fallback` instead.
///
/// Composes with the other guards by nesting: wrap the primary in a circuit
/// breaker or retry policy before handing it here.
pub async fn with_fallback<P, PFut, S, SFut, T, E>(primary: P, fallback: S) -> Result<T, E>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, E>>,
    S: FnOnce() -> SFut,
    SFut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match primary().await {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(error = %err, "Primary operation failed, running fallback");
            fallback().await
        }
    }
}
