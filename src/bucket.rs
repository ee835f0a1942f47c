//! Hash-table buckets and their lock-group sharding.
//!
//! The table is a fixed array of [`N_BUCKETS`](crate::hash::N_BUCKETS)
//! buckets, each owning one B-tree and a member count. Buckets are dealt
//! round-robin into [`LOCK_GROUPS`](crate::hash::LOCK_GROUPS) groups
//! (`bucket % LOCK_GROUPS`); the service wraps each [`BucketGroup`] in one
//! reader/writer lock, so the lock count stays fixed regardless of bucket
//! count.
//!
//! Tree-key collisions across distinct domains are resolved here by exact
//! domain comparison on the chain, never by hash alone.

use crate::btree::BTreeIndex;
use crate::hash::LOCK_GROUPS;
use crate::record::DomainRecord;
use crate::ControlAction;

/// One hash-table slot: a member count and the bucket's tree.
///
/// `members` changes only on the first add of a domain and on a successful
/// delete, never when an existing domain's attributes are replaced.
#[derive(Debug, Default)]
pub struct Bucket {
    members: u64,
    tree: BTreeIndex,
}

impl Bucket {
    /// Number of domains in this bucket.
    pub fn members(&self) -> u64 {
        self.members
    }

    /// True if the bucket holds no domains.
    pub fn is_empty(&self) -> bool {
        self.members == 0
    }

    /// Add or replace a domain. Returns true if the domain was newly
    /// added, false if an existing entry's action/redirect was replaced
    /// in place.
    pub fn apply_add(
        &mut self,
        tree_key: u64,
        domain: &str,
        action: ControlAction,
        redirect: Option<String>,
    ) -> bool {
        let at = self.tree.probe(tree_key);
        if !at.found {
            let record = DomainRecord::new(domain.to_string(), action, redirect);
            self.tree.insert_at(&at, tree_key, vec![record]);
            self.members += 1;
            return true;
        }

        let chain = self
            .tree
            .chain_mut(at.node.expect("found probe names a node"), at.index);
        if let Some(existing) = chain.iter_mut().find(|r| r.domain == domain) {
            existing.action = action;
            existing.redirect = redirect;
            false
        } else {
            // Same tree key, different domain: join the collision chain.
            chain.push(DomainRecord::new(domain.to_string(), action, redirect));
            self.members += 1;
            true
        }
    }

    /// Delete a domain. Returns true if it was present. Deleting the last
    /// record of a chain removes the key from the tree (rebalancing it).
    pub fn apply_delete(&mut self, tree_key: u64, domain: &str) -> bool {
        if self.members == 0 {
            return false;
        }
        let at = self.tree.probe(tree_key);
        if !at.found {
            return false;
        }
        let node = at.node.expect("found probe names a node");
        let chain = self.tree.chain_mut(node, at.index);
        let pos = match chain.iter().position(|r| r.domain == domain) {
            Some(p) => p,
            None => return false,
        };
        if chain.len() == 1 {
            self.tree.remove(tree_key);
        } else {
            chain.remove(pos);
        }
        self.members -= 1;
        true
    }

    /// Exact-match lookup. Returns the action and any stored redirect.
    pub fn lookup(&self, tree_key: u64, domain: &str) -> Option<(ControlAction, Option<&str>)> {
        if self.members == 0 {
            return None;
        }
        let at = self.tree.probe(tree_key);
        if !at.found {
            return None;
        }
        self.tree
            .chain(at.node.expect("found probe names a node"), at.index)
            .iter()
            .find(|r| r.domain == domain)
            .map(|r| (r.action, r.redirect.as_deref()))
    }
}

/// The buckets of one lock group. Slot for bucket `b` is
/// `b / LOCK_GROUPS`; the group index itself is `b % LOCK_GROUPS`.
#[derive(Debug)]
pub struct BucketGroup {
    buckets: Vec<Bucket>,
}

impl BucketGroup {
    /// Build the group holding every bucket congruent to `group` modulo
    /// `LOCK_GROUPS` out of `n_buckets` total. All buckets start empty;
    /// no per-bucket allocation happens until a first insert.
    pub fn new(group: usize, n_buckets: u32) -> Self {
        let total = n_buckets as usize;
        let count = (total - group).div_ceil(LOCK_GROUPS);
        let mut buckets = Vec::with_capacity(count);
        buckets.resize_with(count, Bucket::default);
        Self { buckets }
    }

    /// The bucket with hash-table index `bucket`.
    pub fn bucket(&self, bucket: u32) -> &Bucket {
        &self.buckets[bucket as usize / LOCK_GROUPS]
    }

    /// Exclusive access to the bucket with hash-table index `bucket`.
    pub fn bucket_mut(&mut self, bucket: u32) -> &mut Bucket {
        &mut self.buckets[bucket as usize / LOCK_GROUPS]
    }

    /// Total members across this group's buckets.
    pub fn members(&self) -> u64 {
        self.buckets.iter().map(Bucket::members).sum()
    }
}
