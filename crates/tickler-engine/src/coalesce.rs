//! Debounced batching of timer firings and the display merge rules.
//!
//! Firings within one window are delivered as a single batch, not N events.
//! The debounce is an explicit accumulator plus one deadline rather than a
//! generic utility: [`push`](NotificationCoalescer::push) collects records
//! and (re)starts the window, the engine sleeps until
//! [`deadline`](NotificationCoalescer::deadline) and then calls
//! [`flush`](NotificationCoalescer::flush).
//!
//! Merge rules are asymmetric: a batch that *opens* the display is placed
//! ahead of whatever else is already due, while a batch arriving with the
//! display *open* is appended at the end, never re-sorted into
//! chronological position.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use tickler_core::bucket::BucketKey;
use tickler_core::types::TaskId;

use crate::registry::ReminderRegistry;
use crate::types::{DisplayGroup, ReminderRecord};

/// What downstream signals a flush left owing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushOutcome {
    /// The display state changed and should be re-published.
    pub display_changed: bool,
    /// The change introduced a bucket key not previously shown; exactly one
    /// host notification is owed.
    pub introduced_bucket: bool,
}

/// Folds near-simultaneous firings into single display events.
pub struct NotificationCoalescer {
    window: Duration,
    /// Batch accumulator, deduplicated by id.
    pending: Vec<ReminderRecord>,
    deadline: Option<Instant>,
    display: Vec<DisplayGroup>,
    /// Ids surfaced at least once on the current schedule. Dismissing the
    /// display does not re-queue these; only a schedule change clears them.
    offered: HashSet<TaskId>,
}

impl NotificationCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            deadline: None,
            display: Vec::new(),
            offered: HashSet::new(),
        }
    }

    /// Current ordered display state.
    pub fn display(&self) -> &[DisplayGroup] {
        &self.display
    }

    pub fn display_open(&self) -> bool {
        !self.display.is_empty()
    }

    /// Total records currently displayed (the badge count).
    pub fn displayed_count(&self) -> usize {
        self.display.iter().map(|g| g.records.len()).sum()
    }

    pub fn is_displayed(&self, id: &TaskId) -> bool {
        self.display
            .iter()
            .flat_map(|g| g.records.iter())
            .any(|r| &r.id == id)
    }

    /// When the accumulated batch should be flushed, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Add a fired record to the batch and restart the trailing-edge window.
    /// A record already in the batch is replaced, not duplicated.
    pub fn push(&mut self, record: ReminderRecord) {
        match self.pending.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record,
            None => self.pending.push(record),
        }
        self.deadline = Some(Instant::now() + self.window);
    }

    /// Drop the accumulated batch without flushing. Teardown path: nothing
    /// may fire once the engine is disposed.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }

    /// Allow an id to be offered again. Called when its record is
    /// unregistered or rebuilt with a fresh schedule.
    pub fn forget(&mut self, id: &TaskId) {
        self.offered.remove(id);
    }

    /// Clear the display entirely. Registry contents are untouched and
    /// already-offered reminders are not re-queued.
    pub fn dismiss(&mut self) -> bool {
        if self.display.is_empty() {
            return false;
        }
        self.display.clear();
        true
    }

    /// Fold the accumulated batch into the next display state.
    pub fn flush(&mut self, registry: &mut ReminderRegistry, now: DateTime<Utc>) -> FlushOutcome {
        self.deadline = None;
        let batch: Vec<ReminderRecord> = self.pending.drain(..).collect();
        if batch.is_empty() {
            return FlushOutcome::default();
        }
        if self.display.is_empty() {
            self.open_display(registry, batch, now)
        } else {
            self.extend_display(batch)
        }
    }

    // --- private helpers ---------------------------------------------------

    /// Closed display: freshly-fired groups first, then everything else
    /// already due, ascending by bucket key.
    fn open_display(
        &mut self,
        registry: &mut ReminderRegistry,
        batch: Vec<ReminderRecord>,
        now: DateTime<Utc>,
    ) -> FlushOutcome {
        let fresh: Vec<ReminderRecord> = batch
            .into_iter()
            .filter(|r| !self.offered.contains(&r.id))
            .collect();
        if fresh.is_empty() {
            debug!("flush dropped: every fired record was already offered");
            return FlushOutcome::default();
        }

        let fresh_ids: HashSet<TaskId> = fresh.iter().map(|r| r.id.clone()).collect();
        let mut groups = group_by_key(fresh);
        let mut rest = registry.due_groups(now);
        for group in &mut rest {
            group
                .records
                .retain(|r| !fresh_ids.contains(&r.id) && !self.offered.contains(&r.id));
        }
        rest.retain(|g| !g.records.is_empty());
        for group in rest {
            match groups.iter_mut().find(|g| g.bucket_key == group.bucket_key) {
                // Same bucket as a fresh group; keep the display keys unique.
                Some(existing) => existing.records.extend(group.records),
                None => groups.push(group),
            }
        }

        for record in groups.iter().flat_map(|g| g.records.iter()) {
            self.offered.insert(record.id.clone());
        }
        debug!(groups = groups.len(), "display opened");
        self.display = groups;
        FlushOutcome {
            display_changed: true,
            introduced_bucket: true,
        }
    }

    /// Open display: records already shown are refreshed in place; genuinely
    /// new ones are grouped and appended at the end.
    fn extend_display(&mut self, batch: Vec<ReminderRecord>) -> FlushOutcome {
        let previous_keys: HashSet<BucketKey> = self
            .display
            .iter()
            .map(|g| g.bucket_key.clone())
            .collect();

        let mut changed = false;
        let mut fresh = Vec::new();
        for record in batch {
            let shown = self
                .display
                .iter_mut()
                .flat_map(|g| g.records.iter_mut())
                .find(|r| r.id == record.id);
            match shown {
                Some(slot) => {
                    // Group and position preserved.
                    *slot = record;
                    changed = true;
                }
                None if !self.offered.contains(&record.id) => fresh.push(record),
                None => {}
            }
        }

        for group in group_by_key(fresh) {
            for record in &group.records {
                self.offered.insert(record.id.clone());
            }
            changed = true;
            match self
                .display
                .iter_mut()
                .find(|g| g.bucket_key == group.bucket_key)
            {
                // A group with this key is already showing; join its tail.
                Some(existing) => existing.records.extend(group.records),
                None => self.display.push(group),
            }
        }

        let introduced = self
            .display
            .iter()
            .any(|g| !previous_keys.contains(&g.bucket_key));
        FlushOutcome {
            display_changed: changed,
            introduced_bucket: introduced,
        }
    }
}

/// Group records by bucket key, preserving batch arrival order both across
/// and within groups.
fn group_by_key(records: Vec<ReminderRecord>) -> Vec<DisplayGroup> {
    let mut groups: Vec<DisplayGroup> = Vec::new();
    for record in records {
        let key = record.bucket_key();
        match groups.iter_mut().find(|g| g.bucket_key == key) {
            Some(group) => group.records.push(record),
            None => groups.push(DisplayGroup {
                bucket_key: key,
                records: vec![record],
            }),
        }
    }
    groups
}
