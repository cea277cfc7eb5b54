//! Executes change lists against a live tree, keeping caller ranges valid.

use verso_dom::{Boundary, Dom, NodeId, Range};

use crate::change::{Change, ChangeSet};
use crate::path::boundary_from_path;

/// Applies a single change relative to `container`. `range_idx`, when
/// present, names the entry of `ranges` that update-range changes write to.
/// Inserted and split-off text nodes are pushed to `text_nodes` for the
/// final join pass.
pub fn apply_change(
    dom: &mut Dom,
    container: NodeId,
    change: &Change,
    range_idx: Option<usize>,
    ranges: &mut [Range],
    text_nodes: &mut Vec<NodeId>,
) {
    match change {
        Change::UpdateAttr { path, attrs } => {
            let b = boundary_from_path(dom, container, path);
            let node = dom.node_after(b).expect("update-attr path names no node");
            for attr in attrs {
                dom.set_attr_ns(node, &attr.name, attr.ns.as_deref(), attr.new_value.as_deref());
            }
        }
        Change::UpdateRange(update) => {
            if let (Some(i), Some(new)) = (range_idx, &update.new) {
                let start = boundary_from_path(dom, container, &new.start);
                let end = boundary_from_path(dom, container, &new.end);
                ranges[i].set(start, end);
            }
        }
        Change::Insert { path, content } => {
            let b = boundary_from_path(dom, container, path);
            let mut b = dom.split_boundary(b, ranges);
            for owned in content {
                let node = dom.materialize(owned);
                if owned.is_text() {
                    text_nodes.push(node);
                }
                b = dom.insert_node_at_boundary(node, b, false, ranges);
            }
        }
        Change::Delete { path, content } => {
            let b = boundary_from_path(dom, container, path);
            let b = dom.split_boundary(b, ranges);
            for owned in content {
                if owned.is_text() {
                    delete_text(dom, b, owned.len(), ranges, text_nodes);
                } else {
                    let live = skip_empty_text(dom, b);
                    assert_eq!(
                        dom.name(live),
                        owned.name(),
                        "delete content does not match the tree"
                    );
                    dom.remove_preserving_ranges(live, ranges);
                }
            }
        }
    }
}

/// Consumes `len` chars of text at `b`, removing whole nodes and splitting
/// the last one when it extends past the deletion.
fn delete_text(
    dom: &mut Dom,
    b: Boundary,
    len: usize,
    ranges: &mut [Range],
    text_nodes: &mut Vec<NodeId>,
) {
    let mut remaining = len;
    while remaining > 0 {
        let live = dom.node_after(b).expect("delete runs past end of node");
        assert!(
            dom.is_text_node(live),
            "delete content does not match the tree"
        );
        let live_len = dom.node_len(live);
        if live_len <= remaining {
            dom.remove_preserving_ranges(live, ranges);
            remaining -= live_len;
        } else {
            dom.split_boundary(Boundary::new(live, remaining), ranges);
            let suffix = dom.next_sibling(live).expect("split produced no suffix");
            dom.remove_preserving_ranges(live, ranges);
            text_nodes.push(suffix);
            remaining = 0;
        }
    }
}

fn skip_empty_text(dom: &Dom, b: Boundary) -> NodeId {
    let mut b = b;
    loop {
        let node = dom.node_after(b).expect("delete runs past end of node");
        if !dom.is_empty_text_node(node) {
            return node;
        }
        b.offset += 1;
    }
}

/// Applies an ordered change list, then re-joins the touched text runs so
/// the tree comes back in normalized-text form.
pub fn apply_changes(
    dom: &mut Dom,
    container: NodeId,
    changes: &[Change],
    range_idx: Option<usize>,
    ranges: &mut [Range],
) {
    let mut text_nodes = Vec::new();
    for change in changes {
        apply_change(dom, container, change, range_idx, ranges, &mut text_nodes);
    }
    for node in text_nodes {
        dom.join_text_node(node, ranges);
    }
}

/// Applies a change set and, when a live range is bound, its selection
/// update.
pub fn apply_change_set(
    dom: &mut Dom,
    container: NodeId,
    cs: &ChangeSet,
    mut range: Option<&mut Range>,
    ranges: &mut [Range],
) {
    let mut all: Vec<Range> = Vec::with_capacity(ranges.len() + 1);
    let range_idx = range.as_ref().map(|_| 0);
    if let Some(r) = range.as_deref() {
        all.push(*r);
    }
    all.extend_from_slice(ranges);

    apply_changes(dom, container, &cs.changes, range_idx, &mut all);

    if let (Some(i), Some(update)) = (range_idx, &cs.selection) {
        if let Some(new) = &update.new {
            let start = boundary_from_path(dom, container, &new.start);
            let end = boundary_from_path(dom, container, &new.end);
            all[i].set(start, end);
        }
    }

    match range.as_deref_mut() {
        Some(r) => {
            *r = all[0];
            ranges.copy_from_slice(&all[1..]);
        }
        None => ranges.copy_from_slice(&all),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::change::{AttrEdit, Meta};
    use crate::path::{Path, Step};
    use verso_dom::OwnedNode;

    fn path(steps: &[(usize, &str)]) -> Path {
        steps
            .iter()
            .map(|&(offset, name)| Step::new(offset, name))
            .collect()
    }

    #[test]
    fn insert_and_delete_round_trip() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let before = dom.clone_node(div);

        let insert = Change::insert(path(&[(0, "DIV")]), vec![OwnedNode::text("ab")]);
        apply_changes(&mut dom, div, std::slice::from_ref(&insert), None, &mut []);
        assert_eq!(dom.children(div).len(), 1);
        assert_eq!(dom.text(dom.children(div)[0]), Some("ab"));

        apply_changes(
            &mut dom,
            div,
            std::slice::from_ref(&insert.invert()),
            None,
            &mut [],
        );
        assert_eq!(dom.clone_node(div).normalized(), before.normalized());
    }

    #[test]
    fn text_delete_splits_and_rejoins() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let t = dom.new_text("abcd");
        dom.append_child(div, t);

        // delete "bc" out of the middle
        let delete = Change::delete(
            path(&[(0, "DIV"), (1, "#text")]),
            vec![OwnedNode::text("bc")],
        );
        apply_changes(&mut dom, div, &[delete], None, &mut []);
        assert_eq!(dom.children(div).len(), 1);
        assert_eq!(dom.text(dom.children(div)[0]), Some("ad"));
    }

    #[test]
    fn update_attr_sets_and_removes() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let a = dom.new_element("a");
        dom.append_child(div, a);
        dom.set_attr_ns(a, "href", None, Some("x"));

        let change = Change::UpdateAttr {
            path: path(&[(0, "DIV")]),
            attrs: vec![AttrEdit {
                name: "href".into(),
                ns: None,
                old_value: Some("x".into()),
                new_value: None,
            }],
        };
        apply_changes(&mut dom, div, std::slice::from_ref(&change), None, &mut []);
        assert_eq!(dom.get_attr_ns(a, "href", None), None);

        apply_changes(
            &mut dom,
            div,
            std::slice::from_ref(&change.invert()),
            None,
            &mut [],
        );
        assert_eq!(dom.get_attr_ns(a, "href", None), Some("x"));
    }

    #[test]
    fn change_set_selection_moves_the_bound_range() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let cs = ChangeSet::new(
            vec![Change::insert(
                path(&[(0, "DIV")]),
                vec![OwnedNode::text("hi")],
            )],
            Meta::typing(),
            Some(crate::change::RangeUpdate {
                old: None,
                new: Some(crate::change::PathRange {
                    start: path(&[(0, "DIV"), (2, "#text")]),
                    end: path(&[(0, "DIV"), (2, "#text")]),
                }),
            }),
        );
        let mut range = Range::collapsed(Boundary::new(div, 0));
        apply_change_set(&mut dom, div, &cs, Some(&mut range), &mut []);
        // the text-end position canonicalizes to the parent boundary
        assert_eq!(range.start, Boundary::new(div, 1));
    }
}
