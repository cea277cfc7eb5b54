//! Declarative, path-addressed changes and change sets.
//!
//! A change describes one structural edit relative to a container; content
//! is owned by the change as detached [`OwnedNode`] values, never as live
//! node references. Every change is invertible without consulting the tree.

use serde::{Deserialize, Serialize};

use verso_dom::{OwnedNode, Tendril};

use crate::path::Path;

/// One attribute transition. `None` values mean the attribute is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrEdit {
    pub name: Tendril,
    pub ns: Option<Tendril>,
    pub old_value: Option<Tendril>,
    pub new_value: Option<Tendril>,
}

impl AttrEdit {
    fn inverted(&self) -> AttrEdit {
        AttrEdit {
            name: self.name.clone(),
            ns: self.ns.clone(),
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
        }
    }
}

/// A range recorded as a pair of paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRange {
    pub start: Path,
    pub end: Path,
}

/// A selection transition carried by a change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeUpdate {
    pub old: Option<PathRange>,
    pub new: Option<PathRange>,
}

impl RangeUpdate {
    pub fn invert(&self) -> RangeUpdate {
        RangeUpdate {
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    Insert { path: Path, content: Vec<OwnedNode> },
    Delete { path: Path, content: Vec<OwnedNode> },
    UpdateAttr { path: Path, attrs: Vec<AttrEdit> },
    UpdateRange(RangeUpdate),
}

impl Change {
    pub fn insert(path: Path, content: Vec<OwnedNode>) -> Change {
        Change::Insert { path, content }
    }

    pub fn delete(path: Path, content: Vec<OwnedNode>) -> Change {
        Change::Delete { path, content }
    }

    /// The change that undoes this one. Inserts and deletes swap with their
    /// content kept verbatim; updates swap old and new values.
    pub fn invert(&self) -> Change {
        match self {
            Change::Insert { path, content } => Change::Delete {
                path: path.clone(),
                content: content.clone(),
            },
            Change::Delete { path, content } => Change::Insert {
                path: path.clone(),
                content: content.clone(),
            },
            Change::UpdateAttr { path, attrs } => Change::UpdateAttr {
                path: path.clone(),
                attrs: attrs.iter().map(AttrEdit::inverted).collect(),
            },
            Change::UpdateRange(update) => Change::UpdateRange(update.invert()),
        }
    }
}

/// Opaque change-set metadata. The history coalescer recognizes the kinds
/// `"typing"` and `"enter"`; everything else passes through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub kind: Option<Tendril>,
}

impl Meta {
    pub fn of(kind: &str) -> Meta {
        Meta {
            kind: Some(kind.into()),
        }
    }

    pub fn typing() -> Meta {
        Meta::of("typing")
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }
}

/// An ordered change list plus a selection transition and metadata: one
/// history entry's worth of edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
    pub meta: Meta,
    pub selection: Option<RangeUpdate>,
}

impl ChangeSet {
    pub fn new(changes: Vec<Change>, meta: Meta, selection: Option<RangeUpdate>) -> Self {
        Self {
            changes,
            meta,
            selection,
        }
    }

    /// The change set that undoes this one: changes reversed and each
    /// inverted, selection inverted, metadata preserved.
    pub fn invert(&self) -> ChangeSet {
        ChangeSet {
            changes: self.changes.iter().rev().map(Change::invert).collect(),
            meta: self.meta.clone(),
            selection: self.selection.as_ref().map(RangeUpdate::invert),
        }
    }
}
