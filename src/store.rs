//! Append-only line buffer and per-variable histories.

use std::collections::HashMap;

use tracing::debug;

/// Monotonic nanoseconds since an arbitrary process-local anchor.
pub type Timestamp = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEntry {
    pub text: String,
    pub timestamp: Timestamp,
}

/// Every line read from the input, in arrival order. The index of an entry is
/// its buffer line number.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    entries: Vec<BufferEntry>,
}

impl LineBuffer {
    /// Appends a line and returns the timestamp actually recorded, which is
    /// raised to the previous one if the clock went backwards.
    pub fn push(&mut self, text: String, timestamp: Timestamp) -> Timestamp {
        let timestamp = match self.last_timestamp() {
            Some(last) if timestamp < last => {
                debug!(timestamp, last, "buffer timestamp raised to keep order");
                last
            }
            _ => timestamp,
        };
        self.entries.push(BufferEntry { text, timestamp });
        timestamp
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, line: usize) -> Option<&BufferEntry> {
        self.entries.get(line)
    }

    pub fn timestamp_at(&self, line: usize) -> Option<Timestamp> {
        self.entries.get(line).map(|entry| entry.timestamp)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.entries.last().map(|entry| entry.timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferEntry> {
        self.entries.iter()
    }
}

/// The evolution of one named variable plus a cursor (`focus`) selecting the
/// value currently on display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableHistory {
    pub(crate) name: String,
    pub(crate) values: Vec<String>,
    pub(crate) timestamps: Vec<Timestamp>,
    pub(crate) focus: usize,
}

impl VariableHistory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), values: Vec::new(), timestamps: Vec::new(), focus: 0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focused_value(&self) -> Option<&str> {
        self.values.get(self.focus).map(String::as_str)
    }

    pub fn focused_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.get(self.focus).copied()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.values.len().checked_sub(1)
    }

    pub(crate) fn push(&mut self, value: String, timestamp: Timestamp) {
        let timestamp = self.timestamps.last().map_or(timestamp, |last| timestamp.max(*last));
        self.values.push(value);
        self.timestamps.push(timestamp);
    }

    pub(crate) fn focus_latest(&mut self) {
        self.focus = self.last_index().unwrap_or(0);
    }

    /// Moves the focus by `delta`, clamped to the recorded values. Returns the
    /// timestamp under the new focus.
    pub(crate) fn step_focus(&mut self, delta: isize) -> Option<Timestamp> {
        let last = self.last_index()?;
        self.focus = self.focus.saturating_add_signed(delta).min(last);
        self.focused_timestamp()
    }
}

/// A parsed `name`/`value` pair extracted from one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableUpdate {
    pub name: String,
    pub value: String,
}

/// Variable histories keyed by name. Display order is first-seen order and is
/// kept separately from the map.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    histories: HashMap<String, VariableHistory>,
    order: Vec<String>,
}

impl VariableRegistry {
    /// Appends a value to the named history, creating it on first sight.
    pub fn record(&mut self, update: VariableUpdate, timestamp: Timestamp) -> &mut VariableHistory {
        let VariableUpdate { name, value } = update;
        if !self.histories.contains_key(&name) {
            debug!(name = %name, position = self.order.len(), "new variable");
            self.order.push(name.clone());
        }
        let history =
            self.histories.entry(name).or_insert_with_key(|name| VariableHistory::new(name.clone()));
        history.push(value, timestamp);
        history
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&VariableHistory> {
        self.histories.get(name)
    }

    /// Names in first-seen order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn get_index(&self, index: usize) -> Option<&VariableHistory> {
        self.order.get(index).and_then(|name| self.histories.get(name))
    }

    pub(crate) fn get_index_mut(&mut self, index: usize) -> Option<&mut VariableHistory> {
        let name = self.order.get(index)?;
        self.histories.get_mut(name)
    }

    /// Histories in display order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableHistory> {
        self.order.iter().filter_map(|name| self.histories.get(name))
    }

    /// Histories in no particular order; only for updates that touch all of them.
    pub(crate) fn histories_mut(&mut self) -> impl Iterator<Item = &mut VariableHistory> {
        self.histories.values_mut()
    }

    pub(crate) fn focus_latest_all(&mut self) {
        for history in self.histories.values_mut() {
            history.focus_latest();
        }
    }
}

/// The buffer and the variable registry, grown together by ingestion.
#[derive(Debug, Clone, Default)]
pub struct TemporalStore {
    buffer: LineBuffer,
    registry: VariableRegistry,
}

impl TemporalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one input line. When `live` is set the updated variable's focus
    /// follows its newest value. Returns the recorded timestamp.
    pub fn append(
        &mut self,
        text: String,
        update: Option<VariableUpdate>,
        timestamp: Timestamp,
        live: bool,
    ) -> Timestamp {
        let timestamp = self.buffer.push(text, timestamp);
        if let Some(update) = update {
            let history = self.registry.record(update, timestamp);
            if live {
                history.focus_latest();
            }
        }
        timestamp
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut VariableRegistry {
        &mut self.registry
    }
}
