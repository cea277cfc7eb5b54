//! History advancement, typing coalescing, undo and redo.

use verso_dom::{Dom, OwnedNode, Range};

use crate::apply::apply_change_set;
use crate::change::{Change, ChangeSet, Meta, RangeUpdate};
use crate::context::{Context, ContextOpts};
use crate::frame::{partitioned_change_sets, FrameOpts, LeaveResult};

impl Context {
    /// Folds the open top-level frame's pending records into history,
    /// leaving the frame open for further edits. A no-op without an open
    /// frame; calling with nested frames on the stack is a contract
    /// violation.
    pub fn advance_history(&mut self, dom: &mut Dom) {
        assert!(
            self.stack.is_empty(),
            "advance_history inside a nested frame"
        );
        let Some(mut frame) = self.frame.take() else {
            return;
        };
        self.take_records_into(dom, &mut frame);
        self.merge_frame_into_history(&frame);
        frame.records.clear();
        self.frame = Some(frame);
    }

    /// The next appended change set will not coalesce with the previous
    /// one, even if it looks like continued typing.
    pub fn interrupt_typing(&mut self) {
        self.interrupted = true;
    }

    /// Undoes the entry before the history cursor, replaying its inversion
    /// off the record. A no-op at the root.
    pub fn undo(&mut self, dom: &mut Dom, range: Option<&mut Range>, ranges: &mut [Range]) {
        self.advance_history(dom);
        if self.history_index == 0 {
            return;
        }
        self.history_index -= 1;
        let cs = self.history[self.history_index].invert();
        self.replay(dom, "undo", &cs, range, ranges);
    }

    /// Reapplies the entry at the history cursor. A no-op at the tip.
    pub fn redo(&mut self, dom: &mut Dom, range: Option<&mut Range>, ranges: &mut [Range]) {
        self.advance_history(dom);
        if self.history_index == self.history.len() {
            return;
        }
        let cs = self.history[self.history_index].clone();
        self.history_index += 1;
        self.replay(dom, "redo", &cs, range, ranges);
    }

    fn replay(
        &mut self,
        dom: &mut Dom,
        kind: &str,
        cs: &ChangeSet,
        range: Option<&mut Range>,
        ranges: &mut [Range],
    ) {
        let elem = self.elem;
        let opts = FrameOpts {
            meta: Meta::of(kind),
            ..FrameOpts::default()
        };
        self.capture_off_the_record(dom, opts, move |_, dom| {
            apply_change_set(dom, elem, cs, range, ranges);
            LeaveResult::default()
        });
    }

    /// Appends a completed (or flushed) top-level frame's partitioned
    /// change sets, truncating redoable entries, coalescing typing, and
    /// enforcing the history bound.
    pub(crate) fn merge_frame_into_history(&mut self, frame: &crate::frame::Frame) {
        let sets = partitioned_change_sets(frame);
        if sets.is_empty() {
            return;
        }
        self.history.truncate(self.history_index);

        let single = sets.len() == 1;
        for set in sets {
            let combined = if single && !self.interrupted {
                self.history
                    .last()
                    .and_then(|last| combine_changes(last, &set, &self.opts))
            } else {
                None
            };
            match combined {
                Some(cs) => {
                    log::debug!("history: coalesced typing entry");
                    self.history.pop();
                    self.history.push(cs);
                }
                None => self.history.push(set),
            }
        }
        self.interrupted = false;

        if self.history.len() > self.opts.max_history {
            let excess = self.history.len() - self.opts.max_history;
            self.history.drain(..excess);
        }
        self.history_index = self.history.len();
    }
}

/// Tries to fold a new typing change set into the previous history entry.
///
/// Succeeds only when both sets are a single insert of a single text node,
/// the new insert continues directly after the old one (same path up to the
/// final text step, old offset plus old length equals the new offset), the
/// joined text stays within `max_combine_chars`, and the metadata marks
/// both as typing (or the old entry as the enter that started it).
fn combine_changes(
    old_set: &ChangeSet,
    new_set: &ChangeSet,
    opts: &ContextOpts,
) -> Option<ChangeSet> {
    let typing_pair =
        (old_set.meta.is("typing") || old_set.meta.is("enter")) && new_set.meta.is("typing");
    if !typing_pair {
        return None;
    }
    let [Change::Insert {
        path: old_path,
        content: old_content,
    }] = &old_set.changes[..]
    else {
        return None;
    };
    let [Change::Insert {
        path: new_path,
        content: new_content,
    }] = &new_set.changes[..]
    else {
        return None;
    };
    let [OwnedNode::Text(old_text)] = &old_content[..] else {
        return None;
    };
    let [OwnedNode::Text(new_text)] = &new_content[..] else {
        return None;
    };

    let (old_base, old_step) = old_path.split_text_step();
    let (new_base, new_step) = new_path.split_text_step();
    if old_base != new_base {
        return None;
    }
    let old_len = old_text.chars().count();
    let new_off = new_step?.offset;
    let old_off = old_step.map_or(0, |s| s.offset);
    if old_off + old_len != new_off {
        return None;
    }
    if old_len + new_text.chars().count() > opts.max_combine_chars {
        return None;
    }

    let mut joined = old_text.clone();
    joined.push_str(new_text);
    let selection = match (&old_set.selection, &new_set.selection) {
        (Some(old), Some(new)) => Some(RangeUpdate {
            old: old.old.clone(),
            new: new.new.clone(),
        }),
        (Some(old), None) => Some(old.clone()),
        (None, Some(new)) => Some(new.clone()),
        (None, None) => None,
    };
    Some(ChangeSet::new(
        vec![Change::insert(
            old_path.clone(),
            vec![OwnedNode::Text(joined)],
        )],
        new_set.meta.clone(),
        selection,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path::{Path, Step};

    fn insert_set(steps: &[(usize, &str)], text: &str, meta: &str) -> ChangeSet {
        let path: Path = steps
            .iter()
            .map(|&(offset, name)| Step::new(offset, name))
            .collect();
        ChangeSet::new(
            vec![Change::insert(path, vec![OwnedNode::text(text)])],
            Meta::of(meta),
            None,
        )
    }

    #[test]
    fn combine_joins_adjacent_typing() {
        let opts = ContextOpts::default();
        let old = insert_set(&[(0, "DIV")], "a", "typing");
        let new = insert_set(&[(0, "DIV"), (1, "#text")], "b", "typing");
        let combined = combine_changes(&old, &new, &opts).expect("should combine");
        match &combined.changes[..] {
            [Change::Insert { path, content }] => {
                assert_eq!(path.steps(), [Step::new(0, "DIV")]);
                assert_eq!(content, &[OwnedNode::text("ab")]);
            }
            other => panic!("unexpected combined changes: {other:?}"),
        }
    }

    #[test]
    fn combine_requires_adjacency() {
        let opts = ContextOpts::default();
        let old = insert_set(&[(0, "DIV")], "a", "typing");
        // offset 2 skips a char: not a continuation
        let new = insert_set(&[(0, "DIV"), (2, "#text")], "b", "typing");
        assert!(combine_changes(&old, &new, &opts).is_none());
    }

    #[test]
    fn combine_respects_the_length_bound() {
        let opts = ContextOpts {
            max_combine_chars: 2,
            ..ContextOpts::default()
        };
        let old = insert_set(&[(0, "DIV")], "ab", "typing");
        let new = insert_set(&[(0, "DIV"), (2, "#text")], "c", "typing");
        assert!(combine_changes(&old, &new, &opts).is_none());
    }

    #[test]
    fn combine_accepts_enter_then_typing() {
        let opts = ContextOpts::default();
        let old = insert_set(&[(0, "DIV")], "a", "enter");
        let new = insert_set(&[(0, "DIV"), (1, "#text")], "b", "typing");
        assert!(combine_changes(&old, &new, &opts).is_some());
    }

    #[test]
    fn combine_rejects_other_metadata() {
        let opts = ContextOpts::default();
        let old = insert_set(&[(0, "DIV")], "a", "paste");
        let new = insert_set(&[(0, "DIV"), (1, "#text")], "b", "typing");
        assert!(combine_changes(&old, &new, &opts).is_none());
    }
}
