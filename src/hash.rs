//! Domain normalization and the two index hash functions.
//!
//! Every domain is hashed twice: `bucket_hash` picks the hash-table bucket
//! (and through it the lock group), `tree_key` is the ordering key inside
//! that bucket's B-tree. The two must stay independent; a tree-key collision
//! across distinct domains is resolved by exact string comparison on the
//! record chain, never by hash alone.
//!
//! Both functions are stable across process restarts so that journal replay
//! lands every record in the same bucket it was served from.

/// Number of hash-table buckets. Fixed; empty buckets cost one zeroed slot.
pub const N_BUCKETS: u32 = 65535;

/// Number of lock groups shared by the buckets (`bucket_hash % LOCK_GROUPS`).
pub const LOCK_GROUPS: usize = 10;

/// Normalize a domain for indexing: ASCII lowercase.
///
/// Only `A`-`Z` fold; high bytes pass through unchanged.
pub fn normalize(domain: &str) -> String {
    domain.to_ascii_lowercase()
}

/// Bucket hash: fold the domain as little-endian 16-bit units, XOR each
/// unit shifted left by its index mod 16.
///
/// The caller reduces the result modulo [`N_BUCKETS`]. Input must already
/// be normalized. No allocation.
pub fn bucket_hash(domain: &str) -> u32 {
    let bytes = domain.as_bytes();
    let mut acc: u32 = 0;
    let mut i = 0usize;
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        let unit = u16::from_le_bytes([pair[0], pair[1]]) as u32;
        acc ^= unit << (i & 0x0f);
        i += 1;
    }
    if let [last] = chunks.remainder() {
        acc ^= (*last as u32) << (i & 0x0f);
    }
    acc
}

/// Tree-ordering key: 64-bit ELF-style rolling hash (shift-4, add byte,
/// fold the top nibble back in).
///
/// Purely an ordering key; carries no relation to lexicographic order.
/// Input must already be normalized. No allocation.
pub fn tree_key(domain: &str) -> u64 {
    let mut h: u64 = 0;
    for &b in domain.as_bytes() {
        h = (h << 4).wrapping_add(b as u64);
        let g = h & 0xF000_0000_0000_0000;
        if g != 0 {
            h ^= g >> 56;
            h ^= g;
        }
    }
    h
}

/// Bucket index for a normalized domain.
pub fn bucket_of(domain: &str) -> u32 {
    bucket_hash(domain) % N_BUCKETS
}

/// Lock group owning a bucket.
pub fn group_of(bucket: u32) -> usize {
    (bucket as usize) % LOCK_GROUPS
}
