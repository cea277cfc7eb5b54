//! Distills a raw mutation journal into a canonical record tree.
//!
//! The observer delivers an arbitrary interleaving of inserts, deletes,
//! attribute changes and text edits. Normalization runs in four stages:
//!
//! 1. pair insert/delete sequences in original order, cancelling
//!    insert-then-delete of the same node and grouping contiguous sibling
//!    deletions by their shared anchor;
//! 2. form compound deletes, consuming each deleted node's pending
//!    attribute and text updates so its pre-state can be reconstructed;
//! 3. build a containment tree: records inside deleted subtrees nest under
//!    the delete, records inside inserted subtrees are dropped (the
//!    insert's content already captures them);
//! 4. sort every level into document order of anchors, deletes before
//!    inserts on ties.
//!
//! The result is order-independent across observer batches: any delivery
//! interleaving of the same edits normalizes to the same record tree.

use ahash::{HashMap, HashMapExt};

use verso_dom::{Dom, NodeId, Tendril};

/// A raw structural move, in journal order.
#[derive(Debug, Clone)]
pub(crate) enum Move {
    Insert {
        node: NodeId,
    },
    Delete {
        node: NodeId,
        target: NodeId,
        prev_sibling: Option<NodeId>,
    },
}

/// An attribute's first recorded old value in this batch.
#[derive(Debug, Clone)]
pub(crate) struct AttrOld {
    pub name: Tendril,
    pub ns: Option<Tendril>,
    pub old_value: Option<Tendril>,
}

/// Consolidated attribute/text updates, keyed by node. Only the first old
/// value per attribute (and per text node) survives; the new value is read
/// from the live node at generation time.
#[derive(Debug, Default)]
pub(crate) struct Updates {
    pub attrs: HashMap<NodeId, Vec<AttrOld>>,
    pub texts: HashMap<NodeId, Tendril>,
}

impl Updates {
    pub fn new() -> Self {
        Self {
            attrs: HashMap::new(),
            texts: HashMap::new(),
        }
    }

    pub fn record_attr(
        &mut self,
        node: NodeId,
        name: Tendril,
        ns: Option<Tendril>,
        old_value: Option<Tendril>,
    ) {
        let entries = self.attrs.entry(node).or_default();
        if !entries.iter().any(|a| a.name == name && a.ns == ns) {
            entries.push(AttrOld {
                name,
                ns,
                old_value,
            });
        }
    }

    pub fn record_text(&mut self, node: NodeId, old_value: Tendril) {
        self.texts.entry(node).or_insert(old_value);
    }
}

/// One deletion inside a compound delete, with everything needed to
/// reconstruct the node's pre-state.
#[derive(Debug)]
pub(crate) struct DeleteMember {
    pub node: NodeId,
    pub attrs: Vec<AttrOld>,
    pub old_text: Option<Tendril>,
    pub contained: Vec<Record>,
}

/// A run of contiguous sibling deletions sharing an anchor. The anchor
/// comes from the first member: the boundary after `prev_sibling`, or the
/// start of `target`.
#[derive(Debug)]
pub(crate) struct DeleteGroup {
    pub members: Vec<DeleteMember>,
    pub target: NodeId,
    pub prev_sibling: Option<NodeId>,
}

impl DeleteGroup {
    /// The parent of the position the deletion happened at.
    fn position_parent(&self, dom: &Dom) -> NodeId {
        match self.prev_sibling {
            Some(prev) => dom.parent(prev).unwrap_or(self.target),
            None => self.target,
        }
    }

    /// Index of the member whose subtree contains `node`, if any.
    fn member_containing(&self, dom: &Dom, node: NodeId) -> Option<usize> {
        self.members
            .iter()
            .position(|m| dom.contains(m.node, node))
    }
}

#[derive(Debug)]
pub(crate) enum Record {
    Insert {
        node: NodeId,
    },
    Delete(DeleteGroup),
    UpdateAttr {
        node: NodeId,
        attrs: Vec<AttrOld>,
    },
    UpdateText {
        node: NodeId,
        old_value: Tendril,
    },
}

impl Record {
    /// The live node a record is positioned by, for document-order sorting.
    fn anchor(&self) -> NodeId {
        match self {
            Record::Insert { node } => *node,
            Record::Delete(group) => group.prev_sibling.unwrap_or(group.target),
            Record::UpdateAttr { node, .. } => *node,
            Record::UpdateText { node, .. } => *node,
        }
    }

    /// The node that decides which subtree this record belongs to.
    fn position_node(&self, dom: &Dom) -> NodeId {
        match self {
            Record::Insert { node } => dom.parent(*node).unwrap_or(*node),
            Record::Delete(group) => group.position_parent(dom),
            Record::UpdateAttr { node, .. } => *node,
            Record::UpdateText { node, .. } => *node,
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Record::Delete(_) => 0,
            Record::Insert { .. } => 1,
            Record::UpdateAttr { .. } => 2,
            Record::UpdateText { .. } => 3,
        }
    }
}

#[derive(Debug, Clone)]
struct RawDelete {
    node: NodeId,
    target: NodeId,
    prev_sibling: Option<NodeId>,
}

/// Normalizes one batch of raw records relative to `container`.
pub(crate) fn normalize_records(
    dom: &Dom,
    container: NodeId,
    moves: Vec<Move>,
    mut updates: Updates,
) -> Vec<Record> {
    let (inserted, dels_by_prev, dels_by_target) = pair_moves(moves);
    log::trace!(
        "normalize: {} surviving inserts, {} delete runs",
        inserted.len(),
        dels_by_prev.len() + dels_by_target.len()
    );

    let mut deletes = Vec::new();
    for list in dels_by_prev.into_values().chain(dels_by_target.into_values()) {
        if let Some(group) = compound_delete(list, &mut updates) {
            deletes.push(Record::Delete(group));
        }
    }

    let mut tree: Vec<Record> = Vec::new();
    for group in deletes {
        place(dom, &mut tree, group);
    }
    for node in inserted {
        place(dom, &mut tree, Record::Insert { node });
    }
    for (node, attrs) in updates.attrs.drain() {
        place(dom, &mut tree, Record::UpdateAttr { node, attrs });
    }
    for (node, old_value) in updates.texts.drain() {
        place(dom, &mut tree, Record::UpdateText { node, old_value });
    }

    tree.retain(|rec| {
        let pos = rec.position_node(dom);
        match rec {
            // the container is the frame of reference; its own attributes
            // and text are not path-addressable
            Record::UpdateAttr { .. } | Record::UpdateText { .. } => {
                pos != container && dom.contains(container, pos)
            }
            _ => dom.contains(container, pos),
        }
    });
    sort_level(dom, &mut tree);
    tree
}

type DeleteMap = HashMap<NodeId, Vec<RawDelete>>;

/// Stage 1: walk moves in original order. Insert-then-delete of one node
/// cancels both; deletions are grouped by anchor, and a delete list whose
/// anchor itself goes away is spliced onto the list that carries the
/// anchor's own deletion.
fn pair_moves(moves: Vec<Move>) -> (Vec<NodeId>, DeleteMap, DeleteMap) {
    let mut inserted: Vec<NodeId> = Vec::new();
    let mut dels_by_prev: DeleteMap = HashMap::new();
    let mut dels_by_target: DeleteMap = HashMap::new();

    for mv in moves {
        match mv {
            Move::Insert { node } => {
                assert!(
                    !inserted.contains(&node),
                    "duplicate insert for one node in a batch"
                );
                inserted.push(node);
            }
            Move::Delete {
                node,
                target,
                prev_sibling,
            } => {
                let stranded = dels_by_prev.remove(&node);
                if let Some(pos) = inserted.iter().position(|&n| n == node) {
                    // insert-then-delete: the node never existed for this
                    // batch. Deletions that were anchored on it inherit this
                    // deletion's anchors.
                    inserted.remove(pos);
                    if let Some(mut list) = stranded {
                        if let Some(first) = list.first_mut() {
                            first.target = target;
                            first.prev_sibling = prev_sibling;
                        }
                        push_run(
                            &mut dels_by_prev,
                            &mut dels_by_target,
                            prev_sibling,
                            target,
                            list,
                        );
                    }
                    continue;
                }
                let mut list = vec![RawDelete {
                    node,
                    target,
                    prev_sibling,
                }];
                if let Some(rest) = stranded {
                    list.extend(rest);
                }
                push_run(
                    &mut dels_by_prev,
                    &mut dels_by_target,
                    prev_sibling,
                    target,
                    list,
                );
            }
        }
    }
    (inserted, dels_by_prev, dels_by_target)
}

fn push_run(
    dels_by_prev: &mut DeleteMap,
    dels_by_target: &mut DeleteMap,
    prev_sibling: Option<NodeId>,
    target: NodeId,
    run: Vec<RawDelete>,
) {
    let (map, key) = match prev_sibling {
        Some(prev) => (dels_by_prev, prev),
        None => (dels_by_target, target),
    };
    map.entry(key).or_default().extend(run);
}

/// Stage 2: a delete run becomes one compound record; each member consumes
/// its pending updates so they are not reported separately.
fn compound_delete(list: Vec<RawDelete>, updates: &mut Updates) -> Option<DeleteGroup> {
    let first = list.first()?;
    let target = first.target;
    let prev_sibling = first.prev_sibling;
    let members = list
        .into_iter()
        .map(|del| DeleteMember {
            node: del.node,
            attrs: updates.attrs.remove(&del.node).unwrap_or_default(),
            old_text: updates.texts.remove(&del.node),
            contained: Vec::new(),
        })
        .collect();
    Some(DeleteGroup {
        members,
        target,
        prev_sibling,
    })
}

/// Stage 3: places a record at the right level of the containment tree.
///
/// Containment: a record belongs inside a delete when its position lies in
/// one of the deleted subtrees, and inside an insert when its position lies
/// in the inserted subtree. Records under deletes are kept (their pre-state
/// is needed for reconstruction); records under inserts are discarded. A
/// newly placed delete sweeps up already-placed records it contains; a
/// newly placed insert discards them.
fn place(dom: &Dom, level: &mut Vec<Record>, rec: Record) {
    let pos = rec.position_node(dom);
    for existing in level.iter_mut() {
        match existing {
            Record::Delete(group) => {
                if let Some(i) = group.member_containing(dom, pos) {
                    place(dom, &mut group.members[i].contained, rec);
                    return;
                }
            }
            Record::Insert { node } => {
                if dom.contains(*node, pos) {
                    log::trace!("normalize: record inside inserted subtree dropped");
                    return;
                }
            }
            _ => {}
        }
    }
    match rec {
        Record::Delete(mut group) => {
            let mut kept = Vec::with_capacity(level.len());
            for existing in level.drain(..) {
                let epos = existing.position_node(dom);
                match group.member_containing(dom, epos) {
                    Some(i) => place(dom, &mut group.members[i].contained, existing),
                    None => kept.push(existing),
                }
            }
            *level = kept;
            level.push(Record::Delete(group));
        }
        Record::Insert { node } => {
            level.retain(|existing| !dom.contains(node, existing.position_node(dom)));
            level.push(Record::Insert { node });
        }
        other => level.push(other),
    }
}

/// Stage 4: document order of anchors, deletes before inserts on ties.
fn sort_level(dom: &Dom, level: &mut Vec<Record>) {
    level.sort_by(|a, b| {
        dom.tree_order(a.anchor(), b.anchor())
            .then_with(|| a.sort_rank().cmp(&b.sort_rank()))
    });
    for rec in level {
        if let Record::Delete(group) = rec {
            for member in &mut group.members {
                sort_level(dom, &mut member.contained);
            }
        }
    }
}
