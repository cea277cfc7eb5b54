//! The two ways of watching a subtree for edits.
//!
//! Both variants answer to the same four operations; the choice is made
//! once, at [`Context`](crate::Context) creation, and nothing downstream
//! inspects which variant is in play.
//!
//! The mutation variant drains the dom's journal and runs it through the
//! normalizer, yielding minimal change lists. The snapshot variant only
//! compares deep clones: coarser output (replace-all-children), but no
//! journal required.

use verso_dom::{Dom, DomRecord, NodeId, OwnedNode};

use crate::change::Change;
use crate::generate::generate_changes;
use crate::normalize::{normalize_records, Move, Updates};
use crate::path::{Path, Step};

#[derive(Debug)]
pub enum Observer {
    Mutation(MutationObserver),
    Snapshot(SnapshotObserver),
}

impl Observer {
    pub fn mutation() -> Self {
        Observer::Mutation(MutationObserver { elem: None })
    }

    pub fn snapshot() -> Self {
        Observer::Snapshot(SnapshotObserver {
            elem: None,
            snapshot: None,
        })
    }

    pub fn observe_all(&mut self, dom: &mut Dom, elem: NodeId) {
        match self {
            Observer::Mutation(o) => o.observe_all(dom, elem),
            Observer::Snapshot(o) => o.observe_all(dom, elem),
        }
    }

    /// Materializes everything observed since the last take as a change
    /// list. Empty when nothing happened.
    pub fn take_changes(&mut self, dom: &mut Dom) -> Vec<Change> {
        match self {
            Observer::Mutation(o) => o.take_changes(dom),
            Observer::Snapshot(o) => o.take_changes(dom),
        }
    }

    /// Drops everything observed since the last take.
    pub fn discard_changes(&mut self, dom: &mut Dom) {
        match self {
            Observer::Mutation(o) => o.discard_changes(dom),
            Observer::Snapshot(o) => o.discard_changes(dom),
        }
    }

    pub fn disconnect(&mut self, dom: &mut Dom) {
        match self {
            Observer::Mutation(o) => o.disconnect(dom),
            Observer::Snapshot(o) => o.disconnect(dom),
        }
    }
}

#[derive(Debug)]
pub struct MutationObserver {
    elem: Option<NodeId>,
}

impl MutationObserver {
    fn observe_all(&mut self, dom: &mut Dom, elem: NodeId) {
        log::debug!("observer: mutation observation attached");
        self.elem = Some(elem);
        dom.observe();
    }

    fn take_changes(&mut self, dom: &mut Dom) -> Vec<Change> {
        let elem = self.elem.expect("take_changes while disconnected");
        let mut moves = Vec::new();
        let mut updates = Updates::new();
        for rec in dom.take_records() {
            match rec {
                DomRecord::ChildInserted { node } => moves.push(Move::Insert { node }),
                DomRecord::ChildRemoved {
                    node,
                    target,
                    prev_sibling,
                } => moves.push(Move::Delete {
                    node,
                    target,
                    prev_sibling,
                }),
                DomRecord::AttrChanged {
                    node,
                    name,
                    ns,
                    old_value,
                } => updates.record_attr(node, name, ns, old_value),
                DomRecord::TextChanged { node, old_value } => {
                    updates.record_text(node, old_value)
                }
            }
        }
        if moves.is_empty() && updates.attrs.is_empty() && updates.texts.is_empty() {
            return Vec::new();
        }
        let tree = normalize_records(dom, elem, moves, updates);
        let mut changes = Vec::new();
        generate_changes(dom, elem, &Path::new(), &tree, &mut changes);
        changes
    }

    fn discard_changes(&mut self, dom: &mut Dom) {
        drop(dom.take_records());
    }

    fn disconnect(&mut self, dom: &mut Dom) {
        log::debug!("observer: mutation observation detached");
        dom.stop_observing();
        self.elem = None;
    }
}

#[derive(Debug)]
pub struct SnapshotObserver {
    elem: Option<NodeId>,
    snapshot: Option<OwnedNode>,
}

impl SnapshotObserver {
    fn observe_all(&mut self, dom: &mut Dom, elem: NodeId) {
        log::debug!("observer: snapshot taken");
        self.elem = Some(elem);
        self.snapshot = Some(dom.clone_node(elem));
    }

    fn take_changes(&mut self, dom: &mut Dom) -> Vec<Change> {
        let elem = self.elem.expect("take_changes while disconnected");
        let current = dom.clone_node(elem);
        let snapshot = self.snapshot.as_ref().expect("snapshot missing");
        if current.normalized() == snapshot.normalized() {
            return Vec::new();
        }
        // coarse diff: drop everything the snapshot had, insert everything
        // the live tree has
        let path: Path = [Step::new(0, dom.name(elem))].into_iter().collect();
        let old_children = element_children(snapshot);
        let new_children = element_children(&current);
        self.snapshot = Some(current.clone());
        let mut changes = Vec::new();
        if !old_children.is_empty() {
            changes.push(Change::delete(path.clone(), old_children));
        }
        if !new_children.is_empty() {
            changes.push(Change::insert(path, new_children));
        }
        changes
    }

    fn discard_changes(&mut self, dom: &mut Dom) {
        if let Some(elem) = self.elem {
            self.snapshot = Some(dom.clone_node(elem));
        }
    }

    fn disconnect(&mut self, _dom: &mut Dom) {
        self.elem = None;
        self.snapshot = None;
    }
}

fn element_children(node: &OwnedNode) -> Vec<OwnedNode> {
    match node {
        OwnedNode::Element { children, .. } => children.clone(),
        OwnedNode::Text(_) => Vec::new(),
    }
}
