//! Time-ordered expire-at index

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
pub(crate) struct ExpirationQueue {
    due: BTreeMap<DateTime<Utc>, Vec<String>>,
}

impl ExpirationQueue {
    pub(crate) fn schedule(&mut self, at: DateTime<Utc>, request_id: impl Into<String>) {
        self.due.entry(at).or_default().push(request_id.into());
    }

    /// Remove and return every id due at or before `now`, earliest first
    pub(crate) fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let due_times: Vec<DateTime<Utc>> = self.due.range(..=now).map(|(&at, _)| at).collect();
        due_times
            .into_iter()
            .filter_map(|at| self.due.remove(&at))
            .flatten()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.due.values().map(Vec::len).sum()
    }

    pub(crate) fn next_due(&self) -> Option<DateTime<Utc>> {
        self.due.keys().next().copied()
    }
}
