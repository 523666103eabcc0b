//! Keeps variable focus and the buffer cursor aligned to a single instant.
//!
//! Both walks are local: they start from the current position and step one
//! entry at a time, which is cheap when the operator scrubs line by line.

use crate::store::{LineBuffer, Timestamp, VariableHistory, VariableRegistry};

/// Moves every history's focus to the value that was active at `target`.
///
/// A history whose first value comes after `target` ends up focused on index
/// 0; use [`is_active_at`] to tell that case apart.
pub fn seek_variables(registry: &mut VariableRegistry, target: Timestamp) {
    for history in registry.histories_mut() {
        seek_history(history, target);
    }
}

/// Like [`seek_variables`], but leaves the history called `keep` untouched.
pub fn seek_variables_except(registry: &mut VariableRegistry, keep: &str, target: Timestamp) {
    for history in registry.histories_mut().filter(|history| history.name() != keep) {
        seek_history(history, target);
    }
}

pub fn seek_history(history: &mut VariableHistory, target: Timestamp) {
    let Some(last) = history.last_index() else {
        history.focus = 0;
        return;
    };
    let stamps = &history.timestamps;
    let mut focus = history.focus.min(last);

    if focus > 0 && stamps[focus] > target {
        while focus > 0 && stamps[focus] > target {
            focus -= 1;
        }
    } else {
        while focus < last && stamps[focus + 1] <= target {
            focus += 1;
        }
    }

    history.focus = focus;
}

/// Maps `target` to a buffer line, walking from `current_line`.
///
/// Callers pass timestamps taken from the buffer or from a variable history
/// (which shares the buffer's stamps), so the walk normally stops on an exact
/// match. The walk is bounded by the buffer either way: a target past either
/// end lands on the first or last line.
pub fn scroll_to_time(buffer: &LineBuffer, target: Timestamp, current_line: usize) -> usize {
    let Some(last) = buffer.last_index() else {
        return 0;
    };
    let stamp = |line: usize| buffer.timestamp_at(line).unwrap_or(target);
    let mut line = current_line.min(last);

    while line < last && stamp(line) < target {
        line += 1;
    }
    while line > 0 && stamp(line) > target {
        line -= 1;
    }
    line
}

/// Whether the history had any value at `timestamp`.
pub fn is_active_at(history: &VariableHistory, timestamp: Timestamp) -> bool {
    history.first_timestamp().is_some_and(|first| first <= timestamp)
}
