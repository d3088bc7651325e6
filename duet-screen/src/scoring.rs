//! Deterministic Scorer
//!
//! Maps an ordered tuple of identifiers to a reproducible value in [0, 1).
//! The simulator uses these hash-derived numbers in place of physical
//! binding estimates so repeated runs produce identical rankings on any
//! platform, in any execution order.

use sha2::{Digest, Sha256};

/// Separator placed between components before hashing
pub const COMPONENT_SEPARATOR: &str = "::";

/// 2^53: every integer below it is exactly representable as f64
const MANTISSA_SCALE: f64 = (1u64 << 53) as f64;

/// Score an ordered list of components
///
/// SHA-256 over the `::`-joined components; the first 8 digest bytes are
/// read big-endian and the top 53 bits are scaled into [0, 1). Permuting
/// the components changes the score.
pub fn score<S: AsRef<str>>(components: &[S]) -> f64 {
    let mut hasher = Sha256::new();
    for (index, component) in components.iter().enumerate() {
        if index > 0 {
            hasher.update(COMPONENT_SEPARATOR.as_bytes());
        }
        hasher.update(component.as_ref().as_bytes());
    }
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bits = u64::from_be_bytes(prefix) >> 11;
    bits as f64 / MANTISSA_SCALE
}
