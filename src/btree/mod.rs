//! Arena-backed multiway balanced search tree.
//!
//! One `BTreeIndex` per non-empty bucket, keyed by the 64-bit tree hash.
//! Nodes live in a `Vec` arena and reference each other by index, with an
//! explicit parent index instead of back-pointers; rebalancing is index
//! rewiring and dropping the arena frees the whole tree. Each key slot owns
//! a chain of [`DomainRecord`]s so that distinct domains hashing to the
//! same tree key share one slot.
//!
//! Node shape: up to [`SUBMAX`] keys in ascending order, `keys + 1`
//! children for internal nodes, none for leaves. A node overflowing past
//! `SUBMAX` keys splits around its median, promoting the median into the
//! parent (up to a new root); a non-root node dropping below [`MIN_KEYS`]
//! borrows from a sibling through the parent or merges with one, pulling
//! the separator down (cascading up, possibly collapsing the root).


use crate::record::DomainRecord;

/// Children-per-node cap minus one: the maximum keys a node may hold
/// after a completed operation.
pub const SUBMAX: usize = 7;

/// Maximum keys per node after a completed operation.
pub const MAX_KEYS: usize = SUBMAX;

/// Minimum keys per non-root node.
pub const MIN_KEYS: usize = (SUBMAX + 1) / 2 - 1;

/// The records sharing one tree key, resolved by exact domain comparison.
pub type Chain = Vec<DomainRecord>;

/// Outcome of [`BTreeIndex::probe`]: either the exact slot holding the key,
/// or the leaf insertion point for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Whether the key is present
    pub found: bool,
    /// Node holding the key (hit) or the leaf to insert into (miss);
    /// `None` only for an empty tree
    pub node: Option<usize>,
    /// Key slot (hit) or insertion slot (miss) within the node
    pub index: usize,
}

#[derive(Debug)]
struct Node {
    keys: Vec<u64>,
    chains: Vec<Chain>,
    /// Arena indices of children; empty for a leaf, `keys.len() + 1`
    /// otherwise.
    children: Vec<usize>,
    parent: Option<usize>,
}

impl Node {
    fn new_leaf() -> Self {
        Self {
            keys: Vec::with_capacity(MAX_KEYS + 1),
            chains: Vec::with_capacity(MAX_KEYS + 1),
            children: Vec::new(),
            parent: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// One bucket's balanced tree of tree-key → record-chain slots.
#[derive(Debug, Default)]
pub struct BTreeIndex {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: Option<usize>,
}

impl BTreeIndex {
    /// Create an empty tree. Allocates nothing until the first insert.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
        }
    }

    /// True if the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of live (allocated, non-freed) nodes.
    pub fn live_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Locate `key`: the exact slot on a hit, the leaf insertion point on
    /// a miss. O(log n).
    pub fn probe(&self, key: u64) -> Probe {
        let mut current = match self.root {
            Some(r) => r,
            None => {
                return Probe {
                    found: false,
                    node: None,
                    index: 0,
                }
            }
        };
        loop {
            let node = &self.nodes[current];
            match node.keys.binary_search(&key) {
                Ok(i) => {
                    return Probe {
                        found: true,
                        node: Some(current),
                        index: i,
                    }
                }
                Err(i) => {
                    if node.is_leaf() {
                        return Probe {
                            found: false,
                            node: Some(current),
                            index: i,
                        };
                    }
                    current = node.children[i];
                }
            }
        }
    }

    /// Shared access to the chain at a probed slot.
    pub fn chain(&self, node: usize, index: usize) -> &Chain {
        &self.nodes[node].chains[index]
    }

    /// Exclusive access to the chain at a probed slot.
    pub fn chain_mut(&mut self, node: usize, index: usize) -> &mut Chain {
        &mut self.nodes[node].chains[index]
    }

    /// Insert a new key with its chain at the slot a miss [`probe`]
    /// returned. The probe must be fresh (no intervening mutation) and must
    /// not be a hit; key collisions are the caller's chain to manage.
    ///
    /// Splits overflowing nodes bottom-up, re-parenting every moved child.
    ///
    /// [`probe`]: Self::probe
    pub fn insert_at(&mut self, at: &Probe, key: u64, chain: Chain) {
        debug_assert!(!at.found);
        let leaf = match at.node {
            Some(n) => n,
            None => {
                let root = self.alloc(Node::new_leaf());
                self.root = Some(root);
                root
            }
        };
        self.nodes[leaf].keys.insert(at.index, key);
        self.nodes[leaf].chains.insert(at.index, chain);
        self.fix_overflow(leaf);
    }

    /// Remove `key` and return its chain, or `None` if absent.
    ///
    /// Internal keys are first swapped with their in-order successor so
    /// removal always happens at a leaf, then underflow is repaired
    /// bottom-up.
    pub fn remove(&mut self, key: u64) -> Option<Chain> {
        let at = self.probe(key);
        if !at.found {
            return None;
        }
        let node = at.node.expect("found probe always names a node");
        let index = at.index;

        let (leaf, chain) = if self.nodes[node].is_leaf() {
            self.nodes[node].keys.remove(index);
            let chain = self.nodes[node].chains.remove(index);
            (node, chain)
        } else {
            // Leftmost leaf of the right subtree holds the successor.
            let mut succ = self.nodes[node].children[index + 1];
            while !self.nodes[succ].is_leaf() {
                succ = self.nodes[succ].children[0];
            }
            let succ_key = self.nodes[succ].keys.remove(0);
            let succ_chain = self.nodes[succ].chains.remove(0);
            self.nodes[node].keys[index] = succ_key;
            let chain = std::mem::replace(&mut self.nodes[node].chains[index], succ_chain);
            (succ, chain)
        };

        self.fix_underflow(leaf);
        Some(chain)
    }

    /// In-order iterator over `(key, chain)` slots.
    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter {
            tree: self,
            stack: Vec::new(),
        };
        if let Some(root) = self.root {
            iter.descend(root);
        }
        iter
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Detach a node from the arena, returning its contents and putting
    /// the slot on the free list.
    fn release(&mut self, idx: usize) -> Node {
        self.free.push(idx);
        std::mem::replace(&mut self.nodes[idx], Node::new_leaf())
    }

    fn fix_overflow(&mut self, start: usize) {
        let mut current = start;
        while self.nodes[current].keys.len() > MAX_KEYS {
            let (mid_key, mid_chain, right) = self.split(current);
            match self.nodes[current].parent {
                Some(parent) => {
                    let idx = self.nodes[parent]
                        .keys
                        .binary_search(&mid_key)
                        .unwrap_err();
                    self.nodes[parent].keys.insert(idx, mid_key);
                    self.nodes[parent].chains.insert(idx, mid_chain);
                    self.nodes[parent].children.insert(idx + 1, right);
                    self.nodes[right].parent = Some(parent);
                    current = parent;
                }
                None => {
                    let new_root = self.alloc(Node {
                        keys: vec![mid_key],
                        chains: vec![mid_chain],
                        children: vec![current, right],
                        parent: None,
                    });
                    self.nodes[current].parent = Some(new_root);
                    self.nodes[right].parent = Some(new_root);
                    self.root = Some(new_root);
                    break;
                }
            }
        }
    }

    /// Split an overflowing node around its median. Returns the promoted
    /// key/chain and the new right sibling (parent not yet linked).
    fn split(&mut self, idx: usize) -> (u64, Chain, usize) {
        let mid = self.nodes[idx].keys.len() / 2;
        let node = &mut self.nodes[idx];
        let right_keys = node.keys.split_off(mid + 1);
        let right_chains = node.chains.split_off(mid + 1);
        let mid_key = node.keys.pop().expect("split of non-empty node");
        let mid_chain = node.chains.pop().expect("split of non-empty node");
        let right_children = if node.children.is_empty() {
            Vec::new()
        } else {
            node.children.split_off(mid + 1)
        };
        let parent = node.parent;

        let right = self.alloc(Node {
            keys: right_keys,
            chains: right_chains,
            children: right_children,
            parent,
        });
        for i in 0..self.nodes[right].children.len() {
            let child = self.nodes[right].children[i];
            self.nodes[child].parent = Some(right);
        }
        (mid_key, mid_chain, right)
    }

    fn fix_underflow(&mut self, start: usize) {
        let mut current = start;
        loop {
            if self.nodes[current].keys.len() >= MIN_KEYS {
                return;
            }
            let parent = match self.nodes[current].parent {
                Some(p) => p,
                None => {
                    self.collapse_root();
                    return;
                }
            };
            let pos = self.nodes[parent]
                .children
                .iter()
                .position(|&c| c == current)
                .expect("child lists a node whose parent index points back");

            // Borrow from a sibling richer than the minimum, else merge.
            if pos + 1 < self.nodes[parent].children.len() {
                let right = self.nodes[parent].children[pos + 1];
                if self.nodes[right].keys.len() > MIN_KEYS {
                    self.rotate_from_right(parent, pos, current, right);
                    return;
                }
            }
            if pos > 0 {
                let left = self.nodes[parent].children[pos - 1];
                if self.nodes[left].keys.len() > MIN_KEYS {
                    self.rotate_from_left(parent, pos, left, current);
                    return;
                }
            }
            if pos + 1 < self.nodes[parent].children.len() {
                self.merge(parent, pos);
            } else {
                self.merge(parent, pos - 1);
            }
            current = parent;
        }
    }

    /// Move the separator down into `node` and the right sibling's first
    /// key up into the parent. O(1) rebalance.
    fn rotate_from_right(&mut self, parent: usize, pos: usize, node: usize, right: usize) {
        let sep_key = self.nodes[parent].keys[pos];
        let up_key = self.nodes[right].keys.remove(0);
        let up_chain = self.nodes[right].chains.remove(0);
        let sep_chain = std::mem::replace(&mut self.nodes[parent].chains[pos], up_chain);
        self.nodes[parent].keys[pos] = up_key;
        self.nodes[node].keys.push(sep_key);
        self.nodes[node].chains.push(sep_chain);
        if !self.nodes[right].is_leaf() {
            let moved = self.nodes[right].children.remove(0);
            self.nodes[moved].parent = Some(node);
            self.nodes[node].children.push(moved);
        }
    }

    /// Mirror image of [`rotate_from_right`](Self::rotate_from_right).
    fn rotate_from_left(&mut self, parent: usize, pos: usize, left: usize, node: usize) {
        let sep_key = self.nodes[parent].keys[pos - 1];
        let up_key = self.nodes[left].keys.pop().expect("left sibling above minimum");
        let up_chain = self.nodes[left].chains.pop().expect("left sibling above minimum");
        let sep_chain = std::mem::replace(&mut self.nodes[parent].chains[pos - 1], up_chain);
        self.nodes[parent].keys[pos - 1] = up_key;
        self.nodes[node].keys.insert(0, sep_key);
        self.nodes[node].chains.insert(0, sep_chain);
        if !self.nodes[left].is_leaf() {
            let moved = self.nodes[left].children.pop().expect("internal node has children");
            self.nodes[moved].parent = Some(node);
            self.nodes[node].children.insert(0, moved);
        }
    }

    /// Merge `children[pos + 1]` into `children[pos]`, pulling the
    /// separator down from the parent. The right node is freed.
    fn merge(&mut self, parent: usize, pos: usize) {
        let left = self.nodes[parent].children[pos];
        let right = self.nodes[parent].children[pos + 1];
        let sep_key = self.nodes[parent].keys.remove(pos);
        let sep_chain = self.nodes[parent].chains.remove(pos);
        self.nodes[parent].children.remove(pos + 1);

        let mut right_node = self.release(right);
        self.nodes[left].keys.push(sep_key);
        self.nodes[left].chains.push(sep_chain);
        self.nodes[left].keys.append(&mut right_node.keys);
        self.nodes[left].chains.append(&mut right_node.chains);
        for &child in &right_node.children {
            self.nodes[child].parent = Some(left);
        }
        self.nodes[left].children.append(&mut right_node.children);
    }

    /// A root emptied of keys collapses to its sole child, or to the empty
    /// tree if it was a leaf. Never frees a node still referenced.
    fn collapse_root(&mut self) {
        let root = match self.root {
            Some(r) => r,
            None => return,
        };
        if !self.nodes[root].keys.is_empty() {
            return;
        }
        if self.nodes[root].is_leaf() {
            self.release(root);
            self.root = None;
        } else {
            debug_assert_eq!(self.nodes[root].children.len(), 1);
            let child = self.nodes[root].children[0];
            self.nodes[child].parent = None;
            self.release(root);
            self.root = Some(child);
        }
    }
}

/// In-order traversal state: a stack of `(node, next key slot)` frames.
pub struct Iter<'a> {
    tree: &'a BTreeIndex,
    stack: Vec<(usize, usize)>,
}

impl<'a> Iter<'a> {
    fn descend(&mut self, mut node: usize) {
        loop {
            self.stack.push((node, 0));
            if self.tree.nodes[node].is_leaf() {
                return;
            }
            node = self.tree.nodes[node].children[0];
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (u64, &'a Chain);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, slot)) = self.stack.pop() {
            let n = &self.tree.nodes[node];
            if slot < n.keys.len() {
                self.stack.push((node, slot + 1));
                if !n.is_leaf() {
                    self.descend(n.children[slot + 1]);
                }
                return Some((n.keys[slot], &n.chains[slot]));
            }
        }
        None
    }
}
