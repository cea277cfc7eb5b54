//! Property tests for the path codec: every normalized boundary in a tree
//! survives an encode/decode round trip.

use quickcheck::{Arbitrary, Gen};

use verso_core::{boundary_from_path, path_from_boundary};
use verso_dom::{Boundary, Dom, NodeId, OwnedNode};

#[derive(Debug, Clone)]
struct RandomTree(OwnedNode);

fn arbitrary_node(g: &mut Gen, depth: usize) -> OwnedNode {
    if depth == 0 || bool::arbitrary(g) {
        // short text, sometimes empty so empty-node handling gets exercised
        let len = usize::arbitrary(g) % 4;
        let text: String = "abcd"[..len].to_string();
        OwnedNode::text(&text)
    } else {
        let names = ["P", "SPAN", "B", "EM"];
        let name = names[usize::arbitrary(g) % names.len()];
        let n = usize::arbitrary(g) % 4;
        let children = (0..n).map(|_| arbitrary_node(g, depth - 1)).collect();
        OwnedNode::elem(name, vec![], children)
    }
}

impl Arbitrary for RandomTree {
    fn arbitrary(g: &mut Gen) -> Self {
        let n = usize::arbitrary(g) % 5;
        let children = (0..n).map(|_| arbitrary_node(g, 2)).collect();
        RandomTree(OwnedNode::elem("DIV", vec![], children))
    }
}

fn all_boundaries(dom: &Dom, root: NodeId) -> Vec<Boundary> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        for offset in 0..=dom.node_len(node) {
            out.push(Boundary::new(node, offset));
        }
        stack.extend(dom.children(node).iter().copied());
    }
    out
}

quickcheck::quickcheck! {
    fn path_round_trip(tree: RandomTree) -> bool {
        let mut dom = Dom::new();
        let root = dom.materialize(&tree.0);
        all_boundaries(&dom, root).into_iter().all(|b| {
            let b = dom.normalize_boundary(b);
            let path = path_from_boundary(&dom, root, b);
            boundary_from_path(&dom, root, &path) == b
        })
    }

    fn empty_text_is_invisible_to_paths(tree: RandomTree) -> bool {
        let mut dom = Dom::new();
        let root = dom.materialize(&tree.0);
        let recorded: Vec<_> = all_boundaries(&dom, root)
            .into_iter()
            .map(|b| {
                let b = dom.normalize_boundary(b);
                (b, path_from_boundary(&dom, root, b))
            })
            .collect();

        // slide an empty text node in front of the root's children
        let empty = dom.new_text("");
        let first = dom.children(root).first().copied();
        dom.insert_before(root, empty, first);

        recorded.into_iter().all(|(b, path)| {
            // the equivalent position after the insertion
            let b = if b.node == root {
                Boundary::new(root, b.offset + 1)
            } else {
                b
            };
            path_from_boundary(&dom, root, dom.normalize_boundary(b)) == path
        })
    }
}
