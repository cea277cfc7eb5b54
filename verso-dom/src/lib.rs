//! An arena-backed DOM for verso: elements, text nodes, boundaries and the
//! range-preserving structural primitives the undo engine builds on.
//!
//! Nodes live in a [`slotmap`] arena and are addressed by [`NodeId`]. Detaching
//! a node keeps it (and its subtree) alive in the arena, so records that refer
//! to removed nodes stay resolvable until the [`Dom`] itself is dropped.

mod boundary;
mod dom;
mod range;
mod traverse;

pub use boundary::{after_node, before_node, Boundary};
pub use dom::{Attr, Dom, DomRecord, NodeId, NodeKind, OwnedNode, TEXT_NAME};
pub use range::Range;
pub use traverse::{next_while, prev_while};

pub type Tendril = smartstring::SmartString<smartstring::LazyCompact>;
