//! Thread tree arena
//!
//! Group-based backends (the VM adapter) report threads and thread groups
//! keyed by backend object ID. Group membership is discovered lazily: an
//! unsolicited "thread started" event can race the explicit enumeration
//! reply, and a thread's true parent may only become known after creation.
//!
//! Nodes therefore live in an arena with stable [`ThreadNodeId`] handles,
//! and [`ThreadTree::find_or_create`] is a single idempotent operation so a
//! thread is never double-inserted. A node is parked at the root until its
//! parent group is confirmed, then re-parented in place.

use std::collections::HashMap;

/// Stable arena handle for a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadNodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    Group,
    Thread,
}

#[derive(Debug, Clone)]
pub struct ThreadNode {
    /// Backend object ID.
    pub object_id: u64,
    pub kind: ThreadKind,
    pub name: String,
    parent: Option<ThreadNodeId>,
    children: Vec<ThreadNodeId>,
}

impl ThreadNode {
    pub fn parent(&self) -> Option<ThreadNodeId> {
        self.parent
    }

    pub fn children(&self) -> &[ThreadNodeId] {
        &self.children
    }
}

#[derive(Debug, Default)]
pub struct ThreadTree {
    nodes: Vec<Option<ThreadNode>>,
    by_object_id: HashMap<u64, ThreadNodeId>,
    roots: Vec<ThreadNodeId>,
    current_thread: Option<u64>,
}

impl ThreadTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ThreadNodeId) -> Option<&ThreadNode> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn find(&self, object_id: u64) -> Option<ThreadNodeId> {
        self.by_object_id.get(&object_id).copied()
    }

    /// Find the node for `object_id`, creating a root-level node when it
    /// does not exist yet. Idempotent: the enumeration reply and the
    /// unsolicited thread-started event can both call this for the same ID.
    pub fn find_or_create(&mut self, object_id: u64, kind: ThreadKind) -> ThreadNodeId {
        if let Some(id) = self.by_object_id.get(&object_id) {
            return *id;
        }

        let id = ThreadNodeId(self.nodes.len());
        self.nodes.push(Some(ThreadNode {
            object_id,
            kind,
            name: String::new(),
            parent: None,
            children: Vec::new(),
        }));
        self.by_object_id.insert(object_id, id);
        self.roots.push(id);
        id
    }

    pub fn set_name(&mut self, id: ThreadNodeId, name: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.0).and_then(|slot| slot.as_mut()) {
            node.name = name.into();
        }
    }

    /// Attach `child` under the group with `parent_object_id`, creating the
    /// group node if it has not been seen yet. The child is detached from
    /// its previous parent (or the root list) first.
    pub fn set_parent(&mut self, child: ThreadNodeId, parent_object_id: u64) {
        let parent = self.find_or_create(parent_object_id, ThreadKind::Group);
        if parent == child {
            return;
        }

        self.detach(child);
        if let Some(node) = self.nodes.get_mut(child.0).and_then(|slot| slot.as_mut()) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent.0).and_then(|slot| slot.as_mut()) {
            node.children.push(child);
        }
    }

    /// Remove a node and promote its children to the root until their true
    /// parents are rediscovered.
    pub fn remove(&mut self, object_id: u64) -> bool {
        let Some(id) = self.by_object_id.remove(&object_id) else {
            return false;
        };

        self.detach(id);
        let children = match self.nodes.get_mut(id.0).and_then(|slot| slot.take()) {
            Some(node) => node.children,
            None => Vec::new(),
        };
        for child in children {
            if let Some(node) = self.nodes.get_mut(child.0).and_then(|slot| slot.as_mut()) {
                node.parent = None;
            }
            self.roots.push(child);
        }

        if self.current_thread == Some(object_id) {
            self.current_thread = None;
        }
        true
    }

    pub fn roots(&self) -> &[ThreadNodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.by_object_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_object_id.is_empty()
    }

    pub fn current_thread(&self) -> Option<u64> {
        self.current_thread
    }

    pub fn set_current_thread(&mut self, object_id: Option<u64>) {
        self.current_thread = object_id;
    }

    /// Group nodes still parked at the root: candidates for the periodic
    /// parent-discovery sweep.
    pub fn unparented_groups(&self) -> Vec<u64> {
        self.roots
            .iter()
            .filter_map(|id| self.get(*id))
            .filter(|n| n.kind == ThreadKind::Group)
            .map(|n| n.object_id)
            .collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_object_id.clear();
        self.roots.clear();
        self.current_thread = None;
    }

    fn detach(&mut self, id: ThreadNodeId) {
        let parent = self.nodes.get(id.0).and_then(|slot| slot.as_ref()).and_then(|n| n.parent);
        match parent {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(p.0).and_then(|slot| slot.as_mut()) {
                    node.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_or_create_is_idempotent() {
        let mut tree = ThreadTree::new();
        let a = tree.find_or_create(100, ThreadKind::Thread);
        let b = tree.find_or_create(100, ThreadKind::Thread);
        assert_eq!(a, b);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.roots().len(), 1);
    }

    #[test]
    fn test_reparent_out_of_order() {
        // thread arrives before its group is known
        let mut tree = ThreadTree::new();
        let t = tree.find_or_create(100, ThreadKind::Thread);
        assert!(tree.get(t).unwrap().parent().is_none());

        tree.set_parent(t, 7);
        let g = tree.find(7).unwrap();
        assert_eq!(tree.get(t).unwrap().parent(), Some(g));
        assert_eq!(tree.get(g).unwrap().children(), &[t]);
        // the thread left the root list; the group joined it
        assert_eq!(tree.roots(), &[g]);
    }

    #[test]
    fn test_reparent_moves_between_groups() {
        let mut tree = ThreadTree::new();
        let t = tree.find_or_create(100, ThreadKind::Thread);
        tree.set_parent(t, 7);
        tree.set_parent(t, 8);

        let old = tree.find(7).unwrap();
        let new = tree.find(8).unwrap();
        assert!(tree.get(old).unwrap().children().is_empty());
        assert_eq!(tree.get(new).unwrap().children(), &[t]);
    }

    #[test]
    fn test_remove_promotes_children() {
        let mut tree = ThreadTree::new();
        let t = tree.find_or_create(100, ThreadKind::Thread);
        tree.set_parent(t, 7);

        assert!(tree.remove(7));
        assert!(tree.find(7).is_none());
        assert!(tree.get(t).unwrap().parent().is_none());
        assert!(tree.roots().contains(&t));
    }

    #[test]
    fn test_remove_clears_current_thread() {
        let mut tree = ThreadTree::new();
        tree.find_or_create(100, ThreadKind::Thread);
        tree.set_current_thread(Some(100));
        tree.remove(100);
        assert_eq!(tree.current_thread(), None);
    }

    #[test]
    fn test_unparented_groups() {
        let mut tree = ThreadTree::new();
        tree.find_or_create(1, ThreadKind::Group);
        let t = tree.find_or_create(2, ThreadKind::Thread);
        tree.set_parent(t, 3);
        // group 1 is parked at the root, group 3 is too
        let mut pending = tree.unparented_groups();
        pending.sort_unstable();
        assert_eq!(pending, vec![1, 3]);
    }
}
