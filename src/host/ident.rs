//! # Identifier generation
//!
//! Short random alphanumeric identifiers seeded from the OS, used for watch
//! handles and bridge query correlation.

use rand::distributions::Alphanumeric;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

use super::errors::{HostError, HostResult};

/// Default identifier length
pub const DEFAULT_SIZE: usize = 21;

/// Collisions tolerated by [`unique`] before giving up
pub const MAX_COLLISIONS: usize = 20;

/// Generate a random identifier of `size` alphanumeric symbols, drawn
/// uniformly from a generator seeded by the OS.
pub fn generate(size: usize) -> HostResult<String> {
    let rng = StdRng::from_rng(OsRng).map_err(|e| HostError::Entropy(e.to_string()))?;

    Ok(rng
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect())
}

/// Generate an identifier that `is_taken` reports as free.
///
/// Fails with [`HostError::MaxCollisions`] after [`MAX_COLLISIONS`] retries.
pub fn unique(size: usize, is_taken: impl Fn(&str) -> bool) -> HostResult<String> {
    let mut id = generate(size)?;
    let mut collisions = 0;

    while is_taken(&id) {
        collisions += 1;
        if collisions > MAX_COLLISIONS {
            return Err(HostError::MaxCollisions { attempts: collisions });
        }
        id = generate(size)?;
    }

    Ok(id)
}
