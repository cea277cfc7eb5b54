//! The path codec: positions in the tree encoded as container-relative step
//! lists.
//!
//! A [`Path`] routes from a container down to a boundary. Each [`Step`] is
//! `(offset, name)` where `name` is the node the offset indexes into and
//! `offset` is a *normalized* child index (empty text nodes are invisible,
//! a run of adjacent text nodes counts as one). The final step may instead
//! be a text offset with name `#text`; when text precedes a boundary the
//! encoder always emits such a step, with the summed length of the whole
//! preceding run, so paths stay stable while adjacent text nodes split and
//! merge. A text offset of zero never appears: empty text nodes are not
//! addressable.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use verso_dom::{after_node, before_node, Boundary, Dom, NodeId, Tendril, TEXT_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub offset: usize,
    pub name: Tendril,
}

impl Step {
    pub fn new(offset: usize, name: &str) -> Self {
        Self {
            offset,
            name: name.into(),
        }
    }

    pub fn is_text(&self) -> bool {
        self.name == TEXT_NAME
    }
}

/// Two paths are equal iff their step sequences are element-wise equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    steps: SmallVec<[Step; 4]>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `prefix ++ self`.
    pub fn prefixed(&self, prefix: &Path) -> Path {
        let mut steps = prefix.steps.clone();
        steps.extend(self.steps.iter().cloned());
        Path { steps }
    }

    /// Splits off a trailing text step, if present. The coalescer compares
    /// paths by their non-text prefix.
    pub fn split_text_step(&self) -> (&[Step], Option<&Step>) {
        match self.steps.last() {
            Some(step) if step.is_text() => {
                (&self.steps[..self.steps.len() - 1], Some(step))
            }
            _ => (&self.steps[..], None),
        }
    }
}

impl FromIterator<Step> for Path {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Path {
            steps: iter.into_iter().collect(),
        }
    }
}

/// Steps from `container` down to `node`, or `None` when `node` is not in
/// the container's subtree. Callers that record selection ranges degrade a
/// `None` to an absent range.
pub fn node_path(dom: &Dom, container: NodeId, node: NodeId) -> Option<Path> {
    let mut steps: SmallVec<[Step; 4]> = SmallVec::new();
    let mut cur = node;
    while cur != container {
        let parent = dom.parent(cur)?;
        steps.push(Step {
            offset: dom.normalized_node_index(cur),
            name: dom.name(parent).into(),
        });
        cur = parent;
    }
    steps.reverse();
    Some(Path { steps })
}

/// Fallible form of [`path_from_boundary`], for range recording.
pub fn try_path_from_boundary(dom: &Dom, container: NodeId, boundary: Boundary) -> Option<Path> {
    let b = dom.normalize_boundary(boundary);
    let text_off = dom.preceding_text_length(b);
    if text_off > 0 {
        let start = dom.text_run_start(b).expect("preceding text without a run");
        let mut path = node_path(dom, container, start)?;
        path.push(Step::new(text_off, TEXT_NAME));
        return Some(path);
    }
    match dom.node_after(b) {
        Some(next) => {
            let mut path = node_path(dom, container, b.node)?;
            path.push(Step::new(
                dom.normalized_node_index(next),
                dom.name(b.node),
            ));
            Some(path)
        }
        None => {
            // boundary at the end of its node
            let mut path = node_path(dom, container, b.node)?;
            path.push(Step::new(
                dom.normalized_num_children(b.node),
                dom.name(b.node),
            ));
            Some(path)
        }
    }
}

/// Encodes a boundary as a path relative to `container`. The boundary must
/// lie inside the container's subtree.
pub fn path_from_boundary(dom: &Dom, container: NodeId, boundary: Boundary) -> Path {
    try_path_from_boundary(dom, container, boundary)
        .expect("boundary outside the path container")
}

/// `path_from_boundary` of the position just before `node`.
pub fn path_before_node(dom: &Dom, container: NodeId, node: NodeId) -> Path {
    path_from_boundary(dom, container, before_node(dom, node))
}

/// Decodes a path back to a boundary, asserting the structural invariants
/// along the way: every step's name must match the node it descends into,
/// and text offsets must stay within the text run they address.
pub fn boundary_from_path(dom: &Dom, container: NodeId, path: &Path) -> Boundary {
    assert!(!path.is_empty(), "empty path");
    let mut cur = container;
    let steps = path.steps();
    for (i, step) in steps.iter().enumerate() {
        let last = i + 1 == steps.len();
        assert_eq!(step.name, dom.name(cur), "path step name mismatch");
        if step.is_text() {
            let b = walk_text_run(dom, cur, step.offset);
            if last {
                return b;
            }
            // an interior text step must land between nodes; descend into
            // the node after the run
            let b = dom.normalize_boundary(b);
            assert!(
                !dom.is_text_node(b.node),
                "interior text step lands inside a text node"
            );
            cur = dom.node_after(b).expect("path continues past end of node");
            continue;
        }
        if last {
            let real = dom.real_from_normalized_index(cur, step.offset);
            return dom.normalize_boundary(Boundary::new(cur, real));
        }
        cur = dom
            .normalized_nth_child(cur, step.offset)
            .expect("path step out of bounds");
    }
    unreachable!()
}

/// Walks forward through the text run starting at `first`, consuming
/// `offset` chars. Spills into following text siblings when the offset
/// exceeds the first node's length.
fn walk_text_run(dom: &Dom, first: NodeId, offset: usize) -> Boundary {
    assert!(offset > 0, "text offset 0 is not addressable");
    let mut node = first;
    let mut remaining = offset;
    loop {
        let len = dom.node_len(node);
        if remaining < len {
            return Boundary::new(node, remaining);
        }
        remaining -= len;
        let next = dom.next_sibling(node).filter(|&n| dom.is_text_node(n));
        match next {
            Some(n) if remaining > 0 => node = n,
            _ => {
                assert_eq!(remaining, 0, "text offset spills past the run");
                return dom.normalize_boundary(after_node(dom, node));
            }
        }
    }
}
