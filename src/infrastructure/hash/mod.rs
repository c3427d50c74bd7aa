// Hash functions for lock tags and catalog keys

use xxhash_rust::xxh64::xxh64;

/// Seed shared by every in-memory hash table of the engine
pub const HASH_SEED: u64 = 0x6169_7374_6f72_6521;

/// Hash an arbitrary byte string with xxh64
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    xxh64(bytes, HASH_SEED)
}

/// Map a hash code onto one of `partitions` partitions
///
/// `partitions` must be a power of two.
#[inline]
pub fn partition_for(hash: u64, partitions: usize) -> usize {
    debug_assert!(partitions.is_power_of_two());
    (hash as usize) & (partitions - 1)
}
