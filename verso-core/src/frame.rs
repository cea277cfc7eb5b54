//! Capture frames: nested groupings of edits with per-frame options.
//!
//! A frame collects record items — leaf change lists taken from the
//! observer (or supplied by the caller for unobserved frames) and completed
//! nested frames. Observation is attached when the first top-level frame is
//! entered and detached when it is left. Records are flushed at every
//! transition that must keep frames from bleeding into each other: entering
//! or leaving an unobserved frame, and any nesting step under a
//! partitioning parent.

use verso_dom::{Dom, NodeId, Range};

use crate::change::{Change, ChangeSet, Meta, PathRange, RangeUpdate};
use crate::context::Context;
use crate::path::try_path_from_boundary;

#[derive(Debug, Clone, Default)]
pub struct FrameOpts {
    /// Don't record observed mutations for this frame; the caller supplies
    /// changes on leave instead. Inherited by nested frames.
    pub no_observe: bool,
    /// Flush observed records around every nested frame so each top-level
    /// record item becomes its own change set. Not inherited.
    pub partition_records: bool,
    pub meta: Meta,
    /// The selection before the frame's edits, recorded as paths at enter.
    pub old_range: Option<Range>,
}

#[derive(Debug, Clone)]
pub enum RecordItem {
    Changes(Vec<Change>),
    Frame(Frame),
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub(crate) opts: FrameOpts,
    pub(crate) records: Vec<RecordItem>,
    pub(crate) old_range: Option<PathRange>,
    pub(crate) new_range: Option<PathRange>,
}

impl Frame {
    pub fn meta(&self) -> &Meta {
        &self.opts.meta
    }

    pub fn records(&self) -> &[RecordItem] {
        &self.records
    }
}

/// The outcome handed to [`Context::leave`]: caller-supplied changes (only
/// legal for unobserved frames) and the selection after the edits.
#[derive(Debug, Default)]
pub struct LeaveResult {
    pub changes: Option<Vec<Change>>,
    pub new_range: Option<Range>,
}

pub(crate) fn record_range(dom: &Dom, container: NodeId, range: &Range) -> Option<PathRange> {
    let start = try_path_from_boundary(dom, container, range.start)?;
    let end = try_path_from_boundary(dom, container, range.end)?;
    Some(PathRange { start, end })
}

fn selection_update(
    old_range: &Option<PathRange>,
    new_range: &Option<PathRange>,
) -> Option<RangeUpdate> {
    if old_range.is_none() && new_range.is_none() {
        return None;
    }
    Some(RangeUpdate {
        old: old_range.clone(),
        new: new_range.clone(),
    })
}

/// Flattens a frame's record tree depth-first into one change list.
pub fn collect_changes(frame: &Frame) -> Vec<Change> {
    fn walk(frame: &Frame, out: &mut Vec<Change>) {
        for item in &frame.records {
            match item {
                RecordItem::Changes(changes) => out.extend(changes.iter().cloned()),
                RecordItem::Frame(nested) => walk(nested, out),
            }
        }
    }
    let mut out = Vec::new();
    walk(frame, &mut out);
    out
}

/// One change set for the whole frame.
pub fn change_set_from_frame(frame: &Frame) -> ChangeSet {
    ChangeSet::new(
        collect_changes(frame),
        frame.opts.meta.clone(),
        selection_update(&frame.old_range, &frame.new_range),
    )
}

/// One change set per top-level record item. Leaf items carry the top
/// frame's recorded ranges; nested frames carry their own.
pub(crate) fn partitioned_change_sets(frame: &Frame) -> Vec<ChangeSet> {
    frame
        .records
        .iter()
        .map(|item| match item {
            RecordItem::Changes(changes) => ChangeSet::new(
                changes.clone(),
                frame.opts.meta.clone(),
                selection_update(&frame.old_range, &frame.new_range),
            ),
            RecordItem::Frame(nested) => change_set_from_frame(nested),
        })
        .filter(|cs| !cs.changes.is_empty())
        .collect()
}

/// Keeps a frame entered by [`Context::capture`] from leaking when the
/// captured closure unwinds: while armed, dropping the guard leaves the
/// frame with an empty result.
struct LeaveGuard<'a> {
    ctx: &'a mut Context,
    dom: &'a mut Dom,
    armed: bool,
}

impl Drop for LeaveGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ctx.leave(self.dom, LeaveResult::default());
        }
    }
}

impl Context {
    /// Pushes a capture frame. The first top-level frame attaches
    /// observation to the context's element.
    pub fn enter(&mut self, dom: &mut Dom, opts: FrameOpts) {
        let no_observe =
            opts.no_observe || self.frame.as_ref().is_some_and(|f| f.opts.no_observe);
        match self.frame.take() {
            Some(mut upper) => {
                // flush the upper frame before nesting when it partitions,
                // or when observation stops at this frame
                if upper.opts.partition_records || (no_observe && !upper.opts.no_observe) {
                    self.take_records_into(dom, &mut upper);
                }
                self.stack.push(upper);
            }
            None => {
                let elem = self.elem;
                self.observer.observe_all(dom, elem);
            }
        }
        let old_range = opts
            .old_range
            .as_ref()
            .and_then(|r| record_range(dom, self.elem, r));
        let mut frame = Frame {
            opts,
            records: Vec::new(),
            old_range,
            new_range: None,
        };
        frame.opts.no_observe = no_observe;
        self.frame = Some(frame);
    }

    /// Pops the current frame, flushing observed records at partition and
    /// observation boundaries. Leaving the top-level frame detaches the
    /// observer and folds the frame's change sets into history.
    pub fn leave(&mut self, dom: &mut Dom, result: LeaveResult) -> Frame {
        let mut frame = self.frame.take().expect("leave without enter");
        let upper = self.stack.pop();
        match &upper {
            Some(up) => {
                let crossing = frame.opts.no_observe != up.opts.no_observe;
                if (up.opts.partition_records && !frame.opts.no_observe) || crossing {
                    self.take_records_into(dom, &mut frame);
                }
            }
            None => {
                self.take_records_into(dom, &mut frame);
                self.observer.disconnect(dom);
            }
        }

        if frame.opts.no_observe {
            if let Some(changes) = result.changes {
                if !changes.is_empty() {
                    frame.records.push(RecordItem::Changes(changes));
                }
            }
        } else {
            assert!(
                result.changes.is_none(),
                "changes supplied to an observed frame"
            );
        }
        frame.new_range = result
            .new_range
            .as_ref()
            .and_then(|r| record_range(dom, self.elem, r));

        match upper {
            Some(mut up) => {
                up.records.push(RecordItem::Frame(frame.clone()));
                self.frame = Some(up);
            }
            None => {
                self.merge_frame_into_history(&frame);
            }
        }
        frame
    }

    /// Runs `f` inside its own frame and returns the completed frame.
    ///
    /// `leave` runs on every exit path: if `f` unwinds, the frame is still
    /// popped (with an empty result, so `new_range` stays absent) and a
    /// top-level frame still releases observation.
    pub fn capture<F>(&mut self, dom: &mut Dom, opts: FrameOpts, f: F) -> Frame
    where
        F: FnOnce(&mut Context, &mut Dom) -> LeaveResult,
    {
        self.enter(dom, opts);
        let mut guard = LeaveGuard {
            ctx: self,
            dom,
            armed: true,
        };
        let result = f(guard.ctx, guard.dom);
        guard.armed = false;
        guard.ctx.leave(guard.dom, result)
    }

    /// Like [`Context::capture`], but unobserved and excised from the
    /// surrounding frame afterwards, so the captured edits never reach
    /// history. Undo and redo replay through this.
    pub fn capture_off_the_record<F>(&mut self, dom: &mut Dom, mut opts: FrameOpts, f: F) -> Frame
    where
        F: FnOnce(&mut Context, &mut Dom) -> LeaveResult,
    {
        opts.no_observe = true;
        let frame = self.capture(dom, opts, f);
        if let Some(parent) = self.frame.as_mut() {
            if matches!(parent.records.last(), Some(RecordItem::Frame(_))) {
                parent.records.pop();
            }
        }
        frame
    }

    pub fn change_set_from_frame(&self, frame: &Frame) -> ChangeSet {
        change_set_from_frame(frame)
    }

    /// Flushes the observer into `frame`: unobserved frames discard, the
    /// rest append a leaf record item.
    pub(crate) fn take_records_into(&mut self, dom: &mut Dom, frame: &mut Frame) {
        if frame.opts.no_observe {
            self.observer.discard_changes(dom);
            return;
        }
        let changes = self.observer.take_changes(dom);
        if !changes.is_empty() {
            frame.records.push(RecordItem::Changes(changes));
        }
    }
}
