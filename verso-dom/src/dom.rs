use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::{Boundary, Tendril};

new_key_type! {
    /// Stable per-process identity of a node. Valid for as long as the node's
    /// [`Dom`] is alive, including after the node is detached.
    pub struct NodeId;
}

/// The name text nodes answer to.
pub const TEXT_NAME: &str = "#text";

/// A namespaced attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attr {
    pub name: Tendril,
    pub ns: Option<Tendril>,
    pub value: Tendril,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element { name: Tendril, attrs: Vec<Attr> },
    Text(Tendril),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// A detached, arena-free deep copy of a node. Change records own these;
/// live nodes are never retained by a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnedNode {
    Element {
        name: Tendril,
        attrs: Vec<Attr>,
        children: Vec<OwnedNode>,
    },
    Text(Tendril),
}

impl OwnedNode {
    pub fn elem(name: &str, attrs: Vec<Attr>, children: Vec<OwnedNode>) -> Self {
        OwnedNode::Element {
            name: name.to_ascii_uppercase().into(),
            attrs,
            children,
        }
    }

    pub fn text(value: &str) -> Self {
        OwnedNode::Text(value.into())
    }

    pub fn name(&self) -> &str {
        match self {
            OwnedNode::Element { name, .. } => name,
            OwnedNode::Text(_) => TEXT_NAME,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OwnedNode::Text(_))
    }

    /// Text length for text nodes, child count for elements.
    pub fn len(&self) -> usize {
        match self {
            OwnedNode::Element { children, .. } => children.len(),
            OwnedNode::Text(s) => s.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy with empty text children dropped and adjacent text children
    /// merged, recursively. Two nodes denote the same document iff their
    /// normalized forms are equal.
    pub fn normalized(&self) -> OwnedNode {
        match self {
            OwnedNode::Text(s) => OwnedNode::Text(s.clone()),
            OwnedNode::Element {
                name,
                attrs,
                children,
            } => {
                let mut out: Vec<OwnedNode> = Vec::with_capacity(children.len());
                for child in children {
                    let child = child.normalized();
                    match child {
                        OwnedNode::Text(ref s) => {
                            if s.is_empty() {
                                continue;
                            }
                            if let Some(OwnedNode::Text(prev)) = out.last_mut() {
                                prev.push_str(s);
                                continue;
                            }
                            out.push(child);
                        }
                        _ => out.push(child),
                    }
                }
                OwnedNode::Element {
                    name: name.clone(),
                    attrs: attrs.clone(),
                    children: out,
                }
            }
        }
    }
}

/// A raw mutation record, queued while observation is enabled. Anchors are
/// captured at mutation time: `prev_sibling` is the sibling the removed node
/// used to follow, `target` its old parent.
#[derive(Debug, Clone)]
pub enum DomRecord {
    ChildInserted {
        node: NodeId,
    },
    ChildRemoved {
        node: NodeId,
        target: NodeId,
        prev_sibling: Option<NodeId>,
    },
    AttrChanged {
        node: NodeId,
        name: Tendril,
        ns: Option<Tendril>,
        old_value: Option<Tendril>,
    },
    TextChanged {
        node: NodeId,
        old_value: Tendril,
    },
}

/// The node arena. All mutations go through the `Dom` so that the journal
/// sees them; reads borrow the arena immutably.
#[derive(Debug, Default)]
pub struct Dom {
    nodes: SlotMap<NodeId, NodeData>,
    journal: Option<Vec<DomRecord>>,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    // -- construction ------------------------------------------------------

    pub fn new_element(&mut self, name: &str) -> NodeId {
        self.nodes.insert(NodeData {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Element {
                name: name.to_ascii_uppercase().into(),
                attrs: Vec::new(),
            },
        })
    }

    pub fn new_text(&mut self, value: &str) -> NodeId {
        self.nodes.insert(NodeData {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Text(value.into()),
        })
    }

    /// Deep copy of a subtree as a detached value.
    pub fn clone_node(&self, node: NodeId) -> OwnedNode {
        match self.kind(node) {
            NodeKind::Text(s) => OwnedNode::Text(s.clone()),
            NodeKind::Element { name, attrs } => OwnedNode::Element {
                name: name.clone(),
                attrs: attrs.clone(),
                children: self
                    .children(node)
                    .iter()
                    .map(|&c| self.clone_node(c))
                    .collect(),
            },
        }
    }

    /// Builds arena nodes from a detached value. The returned root is
    /// parentless; attaching it is a separate (journaled) step.
    pub fn materialize(&mut self, owned: &OwnedNode) -> NodeId {
        match owned {
            OwnedNode::Text(s) => self.new_text(s),
            OwnedNode::Element {
                name,
                attrs,
                children,
            } => {
                let id = self.nodes.insert(NodeData {
                    parent: None,
                    children: Vec::new(),
                    kind: NodeKind::Element {
                        name: name.clone(),
                        attrs: attrs.clone(),
                    },
                });
                for child in children {
                    let cid = self.materialize(child);
                    self.nodes[cid].parent = Some(id);
                    self.nodes[id].children.push(cid);
                }
                id
            }
        }
    }

    // -- reads -------------------------------------------------------------

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node].kind
    }

    pub fn name(&self, node: NodeId) -> &str {
        match &self.nodes[node].kind {
            NodeKind::Element { name, .. } => name,
            NodeKind::Text(_) => TEXT_NAME,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].children
    }

    pub fn is_text_node(&self, node: NodeId) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Text(_))
    }

    pub fn is_empty_text_node(&self, node: NodeId) -> bool {
        matches!(&self.nodes[node].kind, NodeKind::Text(s) if s.is_empty())
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node].kind {
            NodeKind::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text length for text nodes, child count for elements.
    pub fn node_len(&self, node: NodeId) -> usize {
        match &self.nodes[node].kind {
            NodeKind::Text(s) => s.chars().count(),
            NodeKind::Element { .. } => self.nodes[node].children.len(),
        }
    }

    /// Position of `node` among its parent's children. Panics if detached.
    pub fn node_index(&self, node: NodeId) -> usize {
        let parent = self.nodes[node].parent.expect("node_index of detached node");
        self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == node)
            .expect("child missing from parent")
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes[node].parent?;
        let idx = self.node_index(node);
        self.nodes[parent].children.get(idx + 1).copied()
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes[node].parent?;
        let idx = self.node_index(node);
        idx.checked_sub(1)
            .map(|i| self.nodes[parent].children[i])
    }

    /// `true` when `a` is `b` or an ancestor of `b`.
    pub fn contains(&self, a: NodeId, b: NodeId) -> bool {
        let mut cur = Some(b);
        while let Some(n) = cur {
            if n == a {
                return true;
            }
            cur = self.nodes[n].parent;
        }
        false
    }

    /// `true` when `b` comes strictly after `a` in document order. Both must
    /// share a tree (attached or the same detached subtree).
    pub fn follows(&self, a: NodeId, b: NodeId) -> bool {
        self.tree_order(a, b) == std::cmp::Ordering::Less
    }

    /// Document order of two nodes in the same tree. An ancestor orders
    /// before its descendants.
    pub fn tree_order(&self, a: NodeId, b: NodeId) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        if a == b {
            return Ordering::Equal;
        }
        let path_a = self.root_path(a);
        let path_b = self.root_path(b);
        debug_assert_eq!(path_a.first(), path_b.first(), "nodes in different trees");
        for (x, y) in path_a.iter().zip(path_b.iter()) {
            if x != y {
                return self.node_index(*x).cmp(&self.node_index(*y));
            }
        }
        // one is an ancestor of the other
        path_a.len().cmp(&path_b.len())
    }

    fn root_path(&self, node: NodeId) -> Vec<NodeId> {
        let mut path = vec![node];
        let mut cur = node;
        while let Some(p) = self.nodes[cur].parent {
            path.push(p);
            cur = p;
        }
        path.reverse();
        path
    }

    pub fn get_attr_ns(&self, node: NodeId, name: &str, ns: Option<&str>) -> Option<&str> {
        match &self.nodes[node].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name == name && a.ns.as_deref() == ns)
                .map(|a| a.value.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attrs(&self, node: NodeId) -> &[Attr] {
        match &self.nodes[node].kind {
            NodeKind::Element { attrs, .. } => attrs,
            NodeKind::Text(_) => &[],
        }
    }

    /// Deep structural equality, ignoring empty text nodes and text-node
    /// splits.
    pub fn is_equal_node(&self, a: NodeId, b: NodeId) -> bool {
        self.clone_node(a).normalized() == self.clone_node(b).normalized()
    }

    // -- normalized child indexing ----------------------------------------
    //
    // The normalized view of an element's children: empty text nodes are
    // invisible and a run of consecutive text nodes occupies one slot.

    pub fn normalized_num_children(&self, parent: NodeId) -> usize {
        let mut count = 0;
        let mut run_slotted = false;
        for &c in self.children(parent) {
            if !self.is_text_node(c) {
                count += 1;
                run_slotted = false;
            } else if !self.is_empty_text_node(c) && !run_slotted {
                count += 1;
                run_slotted = true;
            }
        }
        count
    }

    /// Normalized slot of `node` among its siblings. Every member of a text
    /// run reports the run's slot.
    pub fn normalized_node_index(&self, node: NodeId) -> usize {
        let parent = self.nodes[node]
            .parent
            .expect("normalized_node_index of detached node");
        let mut count = 0;
        let mut run_slotted = false;
        for &c in self.children(parent) {
            if !self.is_text_node(c) {
                if c == node {
                    return count;
                }
                count += 1;
                run_slotted = false;
                continue;
            }
            if c == node {
                return if run_slotted { count - 1 } else { count };
            }
            if !self.is_empty_text_node(c) && !run_slotted {
                count += 1;
                run_slotted = true;
            }
        }
        unreachable!("child missing from parent")
    }

    /// The child at which normalized slot `n` opens.
    pub fn normalized_nth_child(&self, parent: NodeId, n: usize) -> Option<NodeId> {
        let mut count = 0;
        let mut run_slotted = false;
        for &c in self.children(parent) {
            if !self.is_text_node(c) {
                if count == n {
                    return Some(c);
                }
                count += 1;
                run_slotted = false;
            } else if !self.is_empty_text_node(c) && !run_slotted {
                if count == n {
                    return Some(c);
                }
                count += 1;
                run_slotted = true;
            }
        }
        None
    }

    /// Real child index of normalized slot `n`; `children.len()` when `n`
    /// equals the normalized child count (the end position).
    pub fn real_from_normalized_index(&self, parent: NodeId, n: usize) -> usize {
        match self.normalized_nth_child(parent, n) {
            Some(c) => self.node_index(c),
            None => {
                assert_eq!(
                    n,
                    self.normalized_num_children(parent),
                    "normalized index out of bounds"
                );
                self.children(parent).len()
            }
        }
    }

    // -- mutation ----------------------------------------------------------

    fn record(&mut self, rec: DomRecord) {
        if let Some(journal) = &mut self.journal {
            journal.push(rec);
        }
    }

    /// Inserts `child` into `parent` before `before` (append when `None`).
    /// An attached child is detached first, so a move shows up in the journal
    /// as a removal followed by an insertion.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        assert!(!self.contains(child, parent), "insert under own descendant");
        if self.nodes[child].parent.is_some() {
            self.remove_child(child);
        }
        let idx = match before {
            Some(b) => {
                assert_eq!(self.nodes[b].parent, Some(parent), "before is not a child");
                self.node_index(b)
            }
            None => self.nodes[parent].children.len(),
        };
        self.nodes[parent].children.insert(idx, child);
        self.nodes[child].parent = Some(parent);
        self.record(DomRecord::ChildInserted { node: child });
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Detaches `child` from its parent. The subtree stays alive in the
    /// arena.
    pub fn remove_child(&mut self, child: NodeId) {
        let parent = self.nodes[child].parent.expect("remove of detached node");
        let idx = self.node_index(child);
        let prev_sibling = idx.checked_sub(1).map(|i| self.nodes[parent].children[i]);
        self.nodes[parent].children.remove(idx);
        self.nodes[child].parent = None;
        self.record(DomRecord::ChildRemoved {
            node: child,
            target: parent,
            prev_sibling,
        });
    }

    pub fn set_text(&mut self, node: NodeId, value: &str) {
        let old_value = match &mut self.nodes[node].kind {
            NodeKind::Text(s) => std::mem::replace(s, value.into()),
            _ => panic!("set_text on an element"),
        };
        self.record(DomRecord::TextChanged { node, old_value });
    }

    /// Sets (`Some`) or removes (`None`) a namespaced attribute.
    pub fn set_attr_ns(&mut self, node: NodeId, name: &str, ns: Option<&str>, value: Option<&str>) {
        let old_value = {
            let attrs = match &mut self.nodes[node].kind {
                NodeKind::Element { attrs, .. } => attrs,
                _ => panic!("set_attr_ns on a text node"),
            };
            let pos = attrs
                .iter()
                .position(|a| a.name == name && a.ns.as_deref() == ns);
            match (pos, value) {
                (Some(i), Some(v)) => {
                    Some(std::mem::replace(&mut attrs[i].value, v.into()))
                }
                (Some(i), None) => Some(attrs.remove(i).value),
                (None, Some(v)) => {
                    attrs.push(Attr {
                        name: name.into(),
                        ns: ns.map(Into::into),
                        value: v.into(),
                    });
                    None
                }
                (None, None) => return,
            }
        };
        self.record(DomRecord::AttrChanged {
            node,
            name: name.into(),
            ns: ns.map(Into::into),
            old_value,
        });
    }

    /// Replaces `old` with `new` in place: `new` takes over `old`'s position
    /// and children. `old` is left detached and childless.
    pub fn replace_shallow(&mut self, old: NodeId, new: NodeId) {
        let next = self.next_sibling(old);
        let parent = self.nodes[old].parent.expect("replace of detached node");
        let grandchildren: Vec<NodeId> = self.nodes[old].children.clone();
        for c in grandchildren {
            self.insert_before(new, c, None);
        }
        self.remove_child(old);
        self.insert_before(parent, new, next);
    }

    // -- journal -----------------------------------------------------------

    /// Starts queuing mutation records. Pending records from a prior
    /// observation are dropped.
    pub fn observe(&mut self) {
        log::debug!("dom: journal enabled");
        self.journal = Some(Vec::new());
    }

    pub fn is_observing(&self) -> bool {
        self.journal.is_some()
    }

    /// Drains queued records, leaving observation enabled.
    pub fn take_records(&mut self) -> Vec<DomRecord> {
        match &mut self.journal {
            Some(journal) => std::mem::take(journal),
            None => Vec::new(),
        }
    }

    pub fn stop_observing(&mut self) {
        log::debug!("dom: journal disabled");
        self.journal = None;
    }

    // -- convenience for building trees ------------------------------------

    /// Builds `owned` into the arena and appends it to `parent`.
    pub fn append_owned(&mut self, parent: NodeId, owned: &OwnedNode) -> NodeId {
        let id = self.materialize(owned);
        self.append_child(parent, id);
        id
    }

    /// Resolves `boundary` to the node immediately after it, if any.
    pub fn node_at_boundary(&self, boundary: Boundary) -> Option<NodeId> {
        if self.is_text_node(boundary.node) {
            return None;
        }
        self.children(boundary.node).get(boundary.offset).copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fixture() -> (Dom, NodeId) {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        (dom, div)
    }

    #[test]
    fn normalized_indexing_skips_empty_and_merges_runs() {
        let (mut dom, div) = fixture();
        let a = dom.new_text("ab");
        let empty = dom.new_text("");
        let b = dom.new_text("cd");
        let p = dom.new_element("p");
        for n in [a, empty, b, p] {
            dom.append_child(div, n);
        }
        // [ab, "", cd] is one slot, p is the second
        assert_eq!(dom.normalized_num_children(div), 2);
        assert_eq!(dom.normalized_node_index(a), 0);
        assert_eq!(dom.normalized_node_index(b), 0);
        assert_eq!(dom.normalized_node_index(p), 1);
        assert_eq!(dom.normalized_nth_child(div, 0), Some(a));
        assert_eq!(dom.normalized_nth_child(div, 1), Some(p));
        assert_eq!(dom.real_from_normalized_index(div, 1), 3);
        assert_eq!(dom.real_from_normalized_index(div, 2), 4);
    }

    #[test]
    fn journal_records_moves_as_remove_then_insert() {
        let (mut dom, div) = fixture();
        let p = dom.new_element("p");
        let span = dom.new_element("span");
        dom.append_child(div, p);
        dom.append_child(div, span);

        dom.observe();
        dom.insert_before(div, p, None); // move p after span
        let records = dom.take_records();
        assert_eq!(records.len(), 2);
        assert!(matches!(
            records[0],
            DomRecord::ChildRemoved { node, target, prev_sibling: None }
                if node == p && target == div
        ));
        assert!(matches!(records[1], DomRecord::ChildInserted { node } if node == p));
        assert_eq!(dom.children(div), &[span, p]);
    }

    #[test]
    fn attr_records_carry_old_values() {
        let (mut dom, div) = fixture();
        dom.observe();
        dom.set_attr_ns(div, "href", None, Some("x"));
        dom.set_attr_ns(div, "href", None, Some("y"));
        let records = dom.take_records();
        assert!(matches!(
            &records[0],
            DomRecord::AttrChanged { old_value: None, .. }
        ));
        assert!(matches!(
            &records[1],
            DomRecord::AttrChanged { old_value: Some(v), .. } if v == "x"
        ));
        assert_eq!(dom.get_attr_ns(div, "href", None), Some("y"));
    }

    #[test]
    fn detached_subtree_stays_resolvable() {
        let (mut dom, div) = fixture();
        let p = dom.new_element("p");
        let t = dom.new_text("hi");
        dom.append_child(div, p);
        dom.append_child(p, t);
        dom.remove_child(p);
        assert_eq!(dom.parent(p), None);
        assert!(dom.contains(p, t));
        assert_eq!(dom.text(t), Some("hi"));
    }

    #[test]
    fn replace_shallow_keeps_children_and_position() {
        let (mut dom, div) = fixture();
        let old = dom.new_element("p");
        let t = dom.new_text("hi");
        let span = dom.new_element("span");
        dom.append_child(div, old);
        dom.append_child(old, t);
        dom.append_child(div, span);

        let new = dom.new_element("h1");
        dom.replace_shallow(old, new);
        assert_eq!(dom.children(div), &[new, span]);
        assert_eq!(dom.children(new), &[t]);
        assert_eq!(dom.parent(old), None);
        assert!(dom.children(old).is_empty());
    }

    #[test]
    fn document_order_follows_tree_positions() {
        let (mut dom, div) = fixture();
        let p = dom.new_element("p");
        let t = dom.new_text("x");
        let span = dom.new_element("span");
        dom.append_child(div, p);
        dom.append_child(p, t);
        dom.append_child(div, span);

        assert!(dom.follows(p, t)); // ancestor precedes descendant
        assert!(dom.follows(p, span));
        assert!(dom.follows(t, span));
        assert!(!dom.follows(span, p));
    }

    #[test]
    fn owned_normalization_merges_text() {
        let n = OwnedNode::elem(
            "div",
            vec![],
            vec![
                OwnedNode::text("a"),
                OwnedNode::text(""),
                OwnedNode::text("b"),
            ],
        );
        let m = OwnedNode::elem("div", vec![], vec![OwnedNode::text("ab")]);
        assert_eq!(n.normalized(), m.normalized());
    }
}
