//! An undo/redo engine for tree-structured documents.
//!
//! The engine observes mutations to a live [`verso_dom::Dom`] subtree,
//! distills them into canonical, path-addressed [`Change`] lists, and keeps
//! a bounded history of [`ChangeSet`]s that can be inverted and replayed.
//! Edits are grouped into nested capture frames; rapid single-character
//! insertions coalesce into a single history entry.

mod apply;
mod change;
mod context;
mod frame;
mod generate;
mod history;
mod normalize;
mod observer;
mod path;

pub use apply::{apply_change, apply_change_set, apply_changes};
pub use change::{AttrEdit, Change, ChangeSet, Meta, PathRange, RangeUpdate};
pub use context::{Context, ContextOpts};
pub use frame::{change_set_from_frame, collect_changes, Frame, FrameOpts, LeaveResult, RecordItem};
pub use observer::Observer;
pub use path::{boundary_from_path, node_path, path_before_node, path_from_boundary, Path, Step};

pub type Tendril = smartstring::SmartString<smartstring::LazyCompact>;
