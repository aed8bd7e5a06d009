//! Per-context registry of z-indexed descendants.
//!
//! A z-context node owns a registry of every descendant with a non-zero
//! z-index that has no closer z-context ancestor. The registry also keeps
//! the context's render item list: direct children plus registered
//! members, sorted lazily by `(z_index, visit_order)` at render time.

use super::NodeId;

#[derive(Debug, Default)]
pub struct ZRegistry {
    /// Z-registered descendants of the owning context.
    pub(crate) members: Vec<NodeId>,
    /// Render list: the context's direct children plus `members`, kept in
    /// the order of the last sort.
    pub(crate) items: Vec<NodeId>,
    pub(crate) sort_pending: bool,
}

impl ZRegistry {
    /// Number of registered members; the item list only drives rendering
    /// while this is non-zero.
    pub(crate) fn usage(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn add_member(&mut self, node: NodeId) {
        if !self.members.contains(&node) {
            self.members.push(node);
        }
        if !self.items.contains(&node) {
            self.items.push(node);
        }
        self.sort_pending = true;
    }

    pub(crate) fn remove_member(&mut self, node: NodeId, is_direct_child: bool) {
        self.members.retain(|&n| n != node);
        // Direct children stay renderable in the item list; deeper members
        // leave it entirely.
        if !is_direct_child {
            self.items.retain(|&n| n != node);
        }
        self.sort_pending = true;
    }

    pub(crate) fn add_item(&mut self, node: NodeId) {
        if !self.items.contains(&node) {
            self.items.push(node);
        }
        self.sort_pending = true;
    }

    pub(crate) fn remove_item(&mut self, node: NodeId) {
        self.items.retain(|&n| n != node);
        self.members.retain(|&n| n != node);
    }
}

/// Insertion sort by `(z_index, visit_order)` ascending. Frames leave the
/// list near-sorted (few nodes change z or visibility between frames), so
/// this runs near-linear in the common case; visit order breaks ties by
/// current tree position.
pub(crate) fn sort_items(items: &mut [NodeId], key: impl Fn(NodeId) -> (i32, u64)) {
    for i in 1..items.len() {
        let item = items[i];
        let item_key = key(item);
        let mut j = i;
        while j > 0 && key(items[j - 1]) > item_key {
            items[j] = items[j - 1];
            j -= 1;
        }
        items[j] = item;
    }
}
