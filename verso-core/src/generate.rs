//! Walks a sorted record tree and emits ordered, path-based changes.
//!
//! Paths are computed against the live (post-batch) tree, where every
//! record's anchor is still valid; because records come out of the
//! normalizer in document order, the emitted list applies cleanly to the
//! pre-batch tree as well.

use verso_dom::{Boundary, Dom, NodeId, OwnedNode};

use crate::change::{AttrEdit, Change};
use crate::normalize::{AttrOld, DeleteGroup, DeleteMember, Record};
use crate::path::{path_before_node, path_from_boundary, Path};

/// Appends the changes for one level of the record tree to `out`. The level
/// is relative to `container`; `prefix` carries the steps accumulated while
/// recursing into deleted subtrees.
pub(crate) fn generate_changes(
    dom: &Dom,
    container: NodeId,
    prefix: &Path,
    records: &[Record],
    out: &mut Vec<Change>,
) {
    let mut i = 0;
    while i < records.len() {
        match &records[i] {
            Record::Delete(group) => {
                emit_delete(dom, container, prefix, group, out);
                i += 1;
            }
            Record::Insert { node } => {
                i = emit_insert_run(dom, container, prefix, records, i, *node, out);
            }
            Record::UpdateAttr { node, attrs } => {
                let path = path_before_node(dom, container, *node).prefixed(prefix);
                out.push(Change::UpdateAttr {
                    path,
                    attrs: attrs.iter().map(|a| attr_edit(dom, *node, a)).collect(),
                });
                i += 1;
            }
            Record::UpdateText { node, old_value } => {
                // a text edit is a delete of the old value plus an insert of
                // the current node, at one position
                let path = path_before_node(dom, container, *node).prefixed(prefix);
                out.push(Change::delete(
                    path.clone(),
                    vec![OwnedNode::Text(old_value.clone())],
                ));
                out.push(Change::insert(path, vec![dom.clone_node(*node)]));
                i += 1;
            }
        }
    }
}

fn attr_edit(dom: &Dom, node: NodeId, old: &AttrOld) -> AttrEdit {
    AttrEdit {
        name: old.name.clone(),
        ns: old.ns.clone(),
        old_value: old.old_value.clone(),
        new_value: dom
            .get_attr_ns(node, &old.name, old.ns.as_deref())
            .map(Into::into),
    }
}

fn emit_delete(
    dom: &Dom,
    container: NodeId,
    prefix: &Path,
    group: &DeleteGroup,
    out: &mut Vec<Change>,
) {
    let boundary = match group.prev_sibling {
        Some(prev) => {
            let parent = dom.parent(prev).expect("delete anchor detached");
            Boundary::new(parent, dom.node_index(prev) + 1)
        }
        None => Boundary::new(group.target, 0),
    };
    let delete_path = path_from_boundary(dom, container, boundary).prefixed(prefix);

    // changes inside the deleted subtrees come first, addressed as if the
    // content were still in place
    for member in &group.members {
        generate_changes(dom, member.node, &delete_path, &member.contained, out);
    }

    let content = group.members.iter().map(|m| reconstruct(dom, m)).collect();
    out.push(Change::delete(delete_path, content));
}

/// Rebuilds a deleted node's pre-state: text nodes take their recorded old
/// value, elements are cloned with recorded attributes restored.
fn reconstruct(dom: &Dom, member: &DeleteMember) -> OwnedNode {
    if dom.is_text_node(member.node) {
        return match &member.old_text {
            Some(old) => OwnedNode::Text(old.clone()),
            None => dom.clone_node(member.node),
        };
    }
    let mut owned = dom.clone_node(member.node);
    if let OwnedNode::Element { attrs, .. } = &mut owned {
        for rec in &member.attrs {
            let pos = attrs
                .iter()
                .position(|a| a.name == rec.name && a.ns == rec.ns);
            match (&rec.old_value, pos) {
                (Some(v), Some(i)) => attrs[i].value = v.clone(),
                (Some(v), None) => attrs.push(verso_dom::Attr {
                    name: rec.name.clone(),
                    ns: rec.ns.clone(),
                    value: v.clone(),
                }),
                (None, Some(i)) => {
                    attrs.remove(i);
                }
                (None, None) => {}
            }
        }
    }
    owned
}

/// Emits one insert change per run of consecutive sibling inserts. A run
/// ends when the next record's node is not the previous node's live next
/// sibling. Returns the index after the run.
fn emit_insert_run(
    dom: &Dom,
    container: NodeId,
    prefix: &Path,
    records: &[Record],
    start: usize,
    first: NodeId,
    out: &mut Vec<Change>,
) -> usize {
    let mut content = vec![dom.clone_node(first)];
    let mut last = first;
    let mut i = start + 1;
    while i < records.len() {
        match &records[i] {
            Record::Insert { node } if dom.next_sibling(last) == Some(*node) => {
                content.push(dom.clone_node(*node));
                last = *node;
                i += 1;
            }
            _ => break,
        }
    }
    let path = path_before_node(dom, container, first).prefixed(prefix);
    out.push(Change::insert(path, content));
    i
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::normalize::{normalize_records, Move, Updates};
    use crate::path::Step;

    fn moves_from_journal(dom: &mut Dom, updates: &mut Updates) -> Vec<Move> {
        let mut moves = Vec::new();
        for rec in dom.take_records() {
            match rec {
                verso_dom::DomRecord::ChildInserted { node } => {
                    moves.push(Move::Insert { node })
                }
                verso_dom::DomRecord::ChildRemoved {
                    node,
                    target,
                    prev_sibling,
                } => moves.push(Move::Delete {
                    node,
                    target,
                    prev_sibling,
                }),
                verso_dom::DomRecord::AttrChanged {
                    node,
                    name,
                    ns,
                    old_value,
                } => updates.record_attr(node, name, ns, old_value),
                verso_dom::DomRecord::TextChanged { node, old_value } => {
                    updates.record_text(node, old_value)
                }
            }
        }
        moves
    }

    fn changes_for(dom: &mut Dom, container: NodeId) -> Vec<Change> {
        let mut updates = Updates::new();
        let moves = moves_from_journal(dom, &mut updates);
        let tree = normalize_records(dom, container, moves, updates);
        let mut out = Vec::new();
        generate_changes(dom, container, &Path::new(), &tree, &mut out);
        out
    }

    #[test]
    fn move_emits_delete_then_insert_in_document_order() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let p = dom.new_element("p");
        let span = dom.new_element("span");
        dom.append_child(div, p);
        dom.append_child(div, span);

        dom.observe();
        dom.insert_before(div, p, None);
        let changes = changes_for(&mut dom, div);

        assert_eq!(changes.len(), 2);
        match &changes[0] {
            Change::Delete { path, content } => {
                assert_eq!(path, &Path::from_iter([Step::new(0, "DIV")]));
                assert_eq!(content[0].name(), "P");
            }
            other => panic!("expected delete, got {other:?}"),
        }
        match &changes[1] {
            Change::Insert { path, content } => {
                assert_eq!(path, &Path::from_iter([Step::new(1, "DIV")]));
                assert_eq!(content[0].name(), "P");
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn sibling_inserts_coalesce_into_one_change() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        dom.observe();
        let a = dom.new_element("a");
        let b = dom.new_element("b");
        dom.append_child(div, a);
        dom.append_child(div, b);
        let changes = changes_for(&mut dom, div);

        assert_eq!(changes.len(), 1);
        match &changes[0] {
            Change::Insert { content, .. } => {
                assert_eq!(content.len(), 2);
                assert_eq!(content[0].name(), "A");
                assert_eq!(content[1].name(), "B");
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn text_edit_becomes_delete_plus_insert() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let t = dom.new_text("old");
        dom.append_child(div, t);

        dom.observe();
        dom.set_text(t, "new");
        let changes = changes_for(&mut dom, div);

        assert_eq!(changes.len(), 2);
        assert!(matches!(
            &changes[0],
            Change::Delete { content, .. } if content == &[OwnedNode::text("old")]
        ));
        assert!(matches!(
            &changes[1],
            Change::Insert { content, .. } if content == &[OwnedNode::text("new")]
        ));
    }

    #[test]
    fn deleted_element_reconstructs_old_attributes() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let a = dom.new_element("a");
        dom.append_child(div, a);
        dom.set_attr_ns(a, "href", None, Some("x"));

        dom.observe();
        dom.set_attr_ns(a, "href", None, Some("y"));
        dom.remove_child(a);
        let changes = changes_for(&mut dom, div);

        assert_eq!(changes.len(), 1);
        match &changes[0] {
            Change::Delete { content, .. } => match &content[0] {
                OwnedNode::Element { attrs, .. } => {
                    assert_eq!(attrs[0].value, "x");
                }
                other => panic!("expected element, got {other:?}"),
            },
            other => panic!("expected delete, got {other:?}"),
        }
    }
}
