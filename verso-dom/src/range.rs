//! Ranges and the range-preserving structural primitives.
//!
//! A [`Range`] is a start/end boundary pair owned by the caller and mutated
//! in place while the tree changes under it. The primitives in this module
//! perform a structural edit and re-anchor every boundary of every range
//! passed in, so a range stays on the same document position across text
//! splits, node removals and joins.

use crate::boundary::Boundary;
use crate::{Dom, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: Boundary,
    pub end: Boundary,
}

impl Range {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    pub fn collapsed(at: Boundary) -> Self {
        Self::new(at, at)
    }

    pub fn set(&mut self, start: Boundary, end: Boundary) {
        self.start = start;
        self.end = end;
    }
}

fn remap<F>(ranges: &mut [Range], f: F)
where
    F: Fn(Boundary) -> Boundary,
{
    for range in ranges {
        range.start = f(range.start);
        range.end = f(range.end);
    }
}

impl Dom {
    /// Splits the text node under `b` so that `b` becomes an element-level
    /// boundary. Boundaries inside the split-off suffix re-anchor to the new
    /// node. Element boundaries and text-edge boundaries pass through
    /// unchanged (normalized).
    pub fn split_boundary(&mut self, b: Boundary, ranges: &mut [Range]) -> Boundary {
        let b = self.normalize_boundary(b);
        if !self.is_text_node(b.node) {
            return b;
        }
        let node = b.node;
        let offset = b.offset;
        let text = self.text(node).expect("text node").to_string();
        debug_assert!(offset > 0 && offset < text.chars().count());
        let byte = text
            .char_indices()
            .nth(offset)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let (prefix, suffix) = text.split_at(byte);
        let prefix = prefix.to_string();
        let suffix = suffix.to_string();

        let parent = self.parent(node).expect("split of detached text");
        let idx = self.node_index(node);

        self.set_text(node, &prefix);
        let new = self.new_text(&suffix);
        let before = self.children(parent).get(idx + 1).copied();
        self.insert_before(parent, new, before);

        remap(ranges, |x| {
            if x.node == node && x.offset > offset {
                Boundary::new(new, x.offset - offset)
            } else if x.node == node && x.offset == offset {
                Boundary::new(parent, idx + 1)
            } else if x.node == parent && x.offset > idx {
                Boundary::new(parent, x.offset + 1)
            } else {
                x
            }
        });
        Boundary::new(parent, idx + 1)
    }

    /// Inserts `node` at `b`, splitting text as needed. With `merge_text`,
    /// a text node is absorbed into an adjacent text sibling instead of
    /// being attached itself. Returns the boundary just after the inserted
    /// content.
    pub fn insert_node_at_boundary(
        &mut self,
        node: NodeId,
        b: Boundary,
        merge_text: bool,
        ranges: &mut [Range],
    ) -> Boundary {
        let b = self.split_boundary(b, ranges);
        let parent = b.node;
        let idx = b.offset;

        if merge_text && self.is_text_node(node) {
            let value = self.text(node).expect("text node").to_string();
            let added = value.chars().count();
            if let Some(prev) = self.node_before(b).filter(|&n| self.is_text_node(n)) {
                let old_len = self.node_len(prev);
                let combined = format!("{}{}", self.text(prev).unwrap(), value);
                self.set_text(prev, &combined);
                return Boundary::new(prev, old_len + added);
            }
            if let Some(next) = self.node_after(b).filter(|&n| self.is_text_node(n)) {
                let combined = format!("{}{}", value, self.text(next).unwrap());
                self.set_text(next, &combined);
                remap(ranges, |x| {
                    if x.node == next {
                        Boundary::new(next, x.offset + added)
                    } else {
                        x
                    }
                });
                return Boundary::new(next, added);
            }
        }

        let before = self.children(parent).get(idx).copied();
        self.insert_before(parent, node, before);
        remap(ranges, |x| {
            if x.node == parent && x.offset > idx {
                Boundary::new(parent, x.offset + 1)
            } else {
                x
            }
        });
        Boundary::new(parent, idx + 1)
    }

    /// Detaches `node`. Boundaries inside its subtree collapse to its old
    /// position; later sibling offsets shift down.
    pub fn remove_preserving_ranges(&mut self, node: NodeId, ranges: &mut [Range]) {
        let parent = self.parent(node).expect("remove of detached node");
        let idx = self.node_index(node);

        // compute against the pre-removal tree
        let mapped: Vec<(Boundary, Boundary)> = ranges
            .iter()
            .map(|r| {
                let map = |x: Boundary| {
                    if self.contains(node, x.node) {
                        Boundary::new(parent, idx)
                    } else if x.node == parent && x.offset > idx {
                        Boundary::new(parent, x.offset - 1)
                    } else {
                        x
                    }
                };
                (map(r.start), map(r.end))
            })
            .collect();

        self.remove_child(node);
        for (range, (start, end)) in ranges.iter_mut().zip(mapped) {
            range.set(start, end);
        }
    }

    /// Merges the text run around `node` back into a single text node.
    /// No-op for detached or non-text nodes.
    pub fn join_text_node(&mut self, node: NodeId, ranges: &mut [Range]) {
        if self.parent(node).is_none() || !self.is_text_node(node) {
            return;
        }
        let mut node = node;
        while let Some(prev) = self.prev_sibling(node).filter(|&n| self.is_text_node(n)) {
            node = self.merge_text_pair(prev, node, ranges);
        }
        while let Some(next) = self.next_sibling(node).filter(|&n| self.is_text_node(n)) {
            node = self.merge_text_pair(node, next, ranges);
        }
    }

    /// Absorbs `second` into `first` (adjacent text siblings). Returns
    /// `first`.
    fn merge_text_pair(&mut self, first: NodeId, second: NodeId, ranges: &mut [Range]) -> NodeId {
        debug_assert_eq!(self.next_sibling(first), Some(second));
        let parent = self.parent(first).expect("merge of detached text");
        let first_len = self.node_len(first);
        let second_idx = self.node_index(second);

        remap(ranges, |x| {
            if x.node == second {
                Boundary::new(first, first_len + x.offset)
            } else if x.node == parent && x.offset == second_idx {
                Boundary::new(first, first_len)
            } else if x.node == parent && x.offset > second_idx {
                Boundary::new(parent, x.offset - 1)
            } else {
                x
            }
        });

        let combined = format!(
            "{}{}",
            self.text(first).unwrap(),
            self.text(second).unwrap()
        );
        self.remove_child(second);
        self.set_text(first, &combined);
        first
    }

    /// Sets `range` to span `start`..`end`.
    pub fn set_range_from_boundaries(&self, range: &mut Range, start: Boundary, end: Boundary) {
        range.set(start, end);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_reanchors_suffix_boundaries() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let t = dom.new_text("abcd");
        dom.append_child(div, t);

        let mut ranges = [Range::collapsed(Boundary::new(t, 3))];
        let at = dom.split_boundary(Boundary::new(t, 2), &mut ranges);
        assert_eq!(at, Boundary::new(div, 1));
        assert_eq!(dom.children(div).len(), 2);
        let suffix = dom.children(div)[1];
        assert_eq!(dom.text(suffix), Some("cd"));
        assert_eq!(ranges[0].start, Boundary::new(suffix, 1));
    }

    #[test]
    fn remove_collapses_inner_boundaries() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let p = dom.new_element("p");
        let t = dom.new_text("x");
        let span = dom.new_element("span");
        dom.append_child(div, p);
        dom.append_child(p, t);
        dom.append_child(div, span);

        let mut ranges = [
            Range::collapsed(Boundary::new(t, 1)),
            Range::collapsed(Boundary::new(div, 2)),
        ];
        dom.remove_preserving_ranges(p, &mut ranges);
        assert_eq!(ranges[0].start, Boundary::new(div, 0));
        assert_eq!(ranges[1].start, Boundary::new(div, 1));
        assert_eq!(dom.children(div), &[span]);
    }

    #[test]
    fn join_merges_whole_run() {
        let mut dom = Dom::new();
        let div = dom.new_element("div");
        let a = dom.new_text("a");
        let b = dom.new_text("b");
        let c = dom.new_text("c");
        for n in [a, b, c] {
            dom.append_child(div, n);
        }
        let mut ranges = [Range::collapsed(Boundary::new(c, 1))];
        dom.join_text_node(b, &mut ranges);
        assert_eq!(dom.children(div).len(), 1);
        assert_eq!(dom.text(dom.children(div)[0]), Some("abc"));
        assert_eq!(ranges[0].start, Boundary::new(a, 3));
    }
}
