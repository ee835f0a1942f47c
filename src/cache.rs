//! Write-buffering cache in front of the bucket trees.
//!
//! Quick updates land here in O(1) without touching any tree lock and are
//! merged into the trees by a later drain. Each lock group owns two
//! generations of pending updates: `active`, where new writes keep landing,
//! and `draining`, the generation a drain is currently applying. The drain
//! starts with a brief exclusive swap moving `active` into `draining`
//! (ownership transfer, no writer is ever blocked for longer than that),
//! applies a snapshot of `draining` to the trees, and only then clears it;
//! readers scanning active-then-draining-then-tree therefore never miss an
//! admitted write. An entry may transiently be visible in both `draining`
//! and the tree, which is harmless because the cache is consulted first.
//!
//! A pending Delete acts as a tombstone: it masks an older tree entry from
//! searches even before the delete reaches the tree.

use parking_lot::RwLock;

use crate::hash::LOCK_GROUPS;
use crate::{ControlAction, Opcode};

/// A write admitted to the cache but not yet merged into its tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Hash-table bucket index
    pub bucket: u32,
    /// B-tree ordering key
    pub tree_key: u64,
    /// Add or Delete
    pub opcode: Opcode,
    /// Control action (meaningful for Add)
    pub action: ControlAction,
    /// Normalized domain
    pub domain: String,
    /// Redirect target for Redirect adds
    pub redirect: Option<String>,
}

/// Cache verdict for a domain, before the tree is ever consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheHit {
    /// Pending Add: the newest buffered state of this domain.
    Found {
        action: ControlAction,
        redirect: Option<String>,
    },
    /// Pending Delete: masks any older tree entry.
    Deleted,
}

#[derive(Debug, Default)]
struct CacheGroup {
    active: RwLock<Vec<PendingUpdate>>,
    draining: RwLock<Vec<PendingUpdate>>,
}

impl CacheGroup {
    fn scan(list: &[PendingUpdate], tree_key: u64, domain: &str) -> Option<CacheHit> {
        // Newest admission wins, so walk in reverse push order.
        list.iter()
            .rev()
            .find(|p| p.tree_key == tree_key && p.domain == domain)
            .map(|p| match p.opcode {
                Opcode::Delete => CacheHit::Deleted,
                Opcode::Add => CacheHit::Found {
                    action: p.action,
                    redirect: p.redirect.clone(),
                },
            })
    }
}

/// Per-lock-group pending-update lists with two generations each.
#[derive(Debug)]
pub struct WriteCache {
    groups: Vec<CacheGroup>,
}

impl WriteCache {
    /// Create the cache with one empty group per lock group.
    pub fn new() -> Self {
        let mut groups = Vec::with_capacity(LOCK_GROUPS);
        groups.resize_with(LOCK_GROUPS, CacheGroup::default);
        Self { groups }
    }

    /// Admit one update to the group's active generation. O(1) under the
    /// group's cache lock only.
    pub fn push(&self, group: usize, update: PendingUpdate) {
        self.groups[group].active.write().push(update);
    }

    /// Admit a batch of updates to the group's active generation under one
    /// lock acquisition.
    pub fn push_batch(&self, group: usize, updates: Vec<PendingUpdate>) {
        if updates.is_empty() {
            return;
        }
        self.groups[group].active.write().extend(updates);
    }

    /// Look a domain up in the group's pending lists, active generation
    /// first. Shared locks only.
    pub fn lookup(&self, group: usize, tree_key: u64, domain: &str) -> Option<CacheHit> {
        let g = &self.groups[group];
        {
            let active = g.active.read();
            if let Some(hit) = CacheGroup::scan(&active, tree_key, domain) {
                return Some(hit);
            }
        }
        let draining = g.draining.read();
        CacheGroup::scan(&draining, tree_key, domain)
    }

    /// Swap the group's active generation into draining. Brief exclusive
    /// critical section; new writers immediately land in a fresh active
    /// list. Returns a snapshot for the caller to apply so that no cache
    /// lock is held while tree locks are taken.
    ///
    /// At most one drain per group may be in flight; the draining
    /// generation must be empty when this is called.
    pub fn begin_drain(&self, group: usize) -> Vec<PendingUpdate> {
        let g = &self.groups[group];
        let mut active = g.active.write();
        let mut draining = g.draining.write();
        debug_assert!(draining.is_empty(), "overlapping drains on one group");
        *draining = std::mem::take(&mut *active);
        draining.clone()
    }

    /// Discard the group's draining generation once its entries are in the
    /// tree.
    pub fn finish_drain(&self, group: usize) {
        self.groups[group].draining.write().clear();
    }

    /// Total pending entries across both generations of every group.
    pub fn pending(&self) -> usize {
        self.groups
            .iter()
            .map(|g| g.active.read().len() + g.draining.read().len())
            .sum()
    }
}

impl Default for WriteCache {
    fn default() -> Self {
        Self::new()
    }
}
