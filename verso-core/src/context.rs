//! The context: one undo engine bound to one root element.

use verso_dom::{Dom, NodeId};

use crate::change::ChangeSet;
use crate::frame::Frame;
use crate::observer::Observer;

#[derive(Debug, Clone)]
pub struct ContextOpts {
    /// Use the snapshot observer even though mutation observation is
    /// available.
    pub no_mutation_observer: bool,
    /// Upper bound on the joined text length of coalesced typing entries.
    pub max_combine_chars: usize,
    /// Upper bound on history length; the oldest entries are dropped.
    pub max_history: usize,
}

impl Default for ContextOpts {
    fn default() -> Self {
        Self {
            no_mutation_observer: false,
            max_combine_chars: 20,
            max_history: 1000,
        }
    }
}

/// Owns the frame stack, the observer and the history for one root
/// element. The element itself is a back-reference: the context neither
/// creates nor destroys it.
#[derive(Debug)]
pub struct Context {
    pub(crate) elem: NodeId,
    pub(crate) observer: Observer,
    pub(crate) stack: Vec<Frame>,
    pub(crate) frame: Option<Frame>,
    pub(crate) history: Vec<ChangeSet>,
    pub(crate) history_index: usize,
    pub(crate) opts: ContextOpts,
    pub(crate) interrupted: bool,
}

impl Context {
    pub fn new(elem: NodeId, opts: ContextOpts) -> Self {
        let observer = if opts.no_mutation_observer {
            Observer::snapshot()
        } else {
            Observer::mutation()
        };
        Self {
            elem,
            observer,
            stack: Vec::new(),
            frame: None,
            history: Vec::new(),
            history_index: 0,
            opts,
            interrupted: false,
        }
    }

    pub fn elem(&self) -> NodeId {
        self.elem
    }

    pub fn history(&self) -> &[ChangeSet] {
        &self.history
    }

    /// The cursor separating applied entries (before it) from redoable ones.
    pub fn history_index(&self) -> usize {
        self.history_index
    }

    /// Abandons any in-progress frames and detaches the observer. History
    /// is left intact; pending observed records are discarded.
    pub fn close(&mut self, dom: &mut Dom) {
        if self.frame.is_some() {
            self.observer.disconnect(dom);
            self.frame = None;
            self.stack.clear();
        }
    }
}
