//! Bucket-keyed store of live reminder records.
//!
//! Invariants: a record is present iff its task is not complete and its
//! reminder day is today or later; a record lives in exactly one bucket;
//! empty buckets are deleted. Lookups by id are linear scans across all
//! buckets: the live-reminder count is small, and scans keep the store a
//! single ordered map.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use tickler_core::bucket::{self, BucketKey};
use tickler_core::types::TaskId;

use crate::timer::TimerController;
use crate::types::{DisplayGroup, ReminderRecord, TimerState};

/// Mapping from bucket key to insertion-ordered records.
#[derive(Default)]
pub struct ReminderRegistry {
    buckets: BTreeMap<BucketKey, Vec<ReminderRecord>>,
}

impl ReminderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of live records across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &TaskId) -> Option<&ReminderRecord> {
        self.buckets
            .values()
            .flat_map(|records| records.iter())
            .find(|r| &r.id == id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut ReminderRecord> {
        self.buckets
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .find(|r| &r.id == id)
    }

    /// Ids of every record currently deferred past the direct timer horizon.
    pub fn deferred_ids(&self) -> Vec<TaskId> {
        self.buckets
            .values()
            .flat_map(|records| records.iter())
            .filter(|r| r.timer_state == TimerState::Deferred)
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn has_deferred(&self) -> bool {
        self.buckets
            .values()
            .flat_map(|records| records.iter())
            .any(|r| r.timer_state == TimerState::Deferred)
    }

    /// Insert a record at the tail of its bucket and arm its timer.
    ///
    /// No-op (returning `false`) when the id is already present, the task is
    /// complete, or the reminder day has passed. Filtering rules, not
    /// errors.
    pub fn register(
        &mut self,
        mut record: ReminderRecord,
        timers: &mut TimerController,
        now: DateTime<Utc>,
    ) -> bool {
        if self.contains(&record.id) {
            debug!(task_id = %record.id, "register skipped: id already present");
            return false;
        }
        if record.status.is_complete() {
            return false;
        }
        if !bucket::is_valid_at(record.reminder_at, now) {
            debug!(task_id = %record.id, "register skipped: reminder day has passed");
            return false;
        }

        timers.arm(&mut record, now);
        let key = record.bucket_key();
        info!(task_id = %record.id, bucket = %key, state = ?record.timer_state, "reminder registered");
        self.buckets.entry(key).or_default().push(record);
        true
    }

    /// Remove a record by id, cancelling its timer. Benign no-op when the id
    /// is unknown.
    pub fn unregister(
        &mut self,
        id: &TaskId,
        timers: &mut TimerController,
    ) -> Option<ReminderRecord> {
        let (key, index) = self.position(id)?;
        timers.cancel(id);
        let mut record = self.remove_at(&key, index)?;
        record.timer_state = TimerState::Idle;
        info!(task_id = %id, bucket = %key, "reminder unregistered");
        Some(record)
    }

    /// Replace a record with a freshly built one, re-deriving its schedule.
    ///
    /// Unknown ids fall through to [`register`](Self::register). A record
    /// whose task became complete, or whose reminder day moved into the
    /// past, is removed without re-arming. When the bucket key is
    /// unchanged the new record takes the old one's position; otherwise it
    /// is appended to the tail of its new bucket.
    pub fn update(
        &mut self,
        mut record: ReminderRecord,
        timers: &mut TimerController,
        now: DateTime<Utc>,
    ) {
        let Some((old_key, index)) = self.position(&record.id) else {
            self.register(record, timers, now);
            return;
        };

        timers.cancel(&record.id);
        if record.status.is_complete() || !bucket::is_valid_at(record.reminder_at, now) {
            self.remove_at(&old_key, index);
            info!(task_id = %record.id, "reminder dropped on update");
            return;
        }

        timers.arm(&mut record, now);
        let new_key = record.bucket_key();
        if new_key == old_key {
            if let Some(records) = self.buckets.get_mut(&old_key) {
                if let Some(slot) = records.get_mut(index) {
                    *slot = record;
                }
            }
        } else {
            self.remove_at(&old_key, index);
            debug!(task_id = %record.id, from = %old_key, to = %new_key, "reminder moved buckets");
            self.buckets.entry(new_key).or_default().push(record);
        }
    }

    /// Transition a record to `Fired` after its timer reported in, returning
    /// a snapshot of it. `None` for ids no longer registered.
    pub fn mark_fired(&mut self, id: &TaskId) -> Option<ReminderRecord> {
        let record = self.get_mut(id)?;
        record.timer_state = TimerState::Fired;
        Some(record.clone())
    }

    /// Currently-due groups, ascending by bucket key.
    ///
    /// A bucket qualifies when its first record is visible (its day is today
    /// and, for timed reminders, its instant has arrived); within it, only
    /// records individually due are returned. Past-due records with no live
    /// timer become `Fired` here, on first query.
    pub fn due_groups(&mut self, now: DateTime<Utc>) -> Vec<DisplayGroup> {
        let mut groups = Vec::new();
        for (key, records) in self.buckets.iter_mut() {
            let visible = records
                .first()
                .is_some_and(|r| bucket::is_visible_at(r.reminder_at, r.all_day, now));
            if !visible {
                continue;
            }
            let mut due = Vec::new();
            for record in records.iter_mut() {
                if record.is_due(now) {
                    record.timer_state = TimerState::Fired;
                    due.push(record.clone());
                }
            }
            if !due.is_empty() {
                groups.push(DisplayGroup {
                    bucket_key: key.clone(),
                    records: due,
                });
            }
        }
        groups
    }

    // --- private helpers ---------------------------------------------------

    /// Locate a record by id: linear scan over all buckets.
    fn position(&self, id: &TaskId) -> Option<(BucketKey, usize)> {
        for (key, records) in &self.buckets {
            if let Some(index) = records.iter().position(|r| &r.id == id) {
                return Some((key.clone(), index));
            }
        }
        None
    }

    /// Remove the record at a known position, dropping the bucket if it is
    /// now empty.
    fn remove_at(&mut self, key: &BucketKey, index: usize) -> Option<ReminderRecord> {
        let records = self.buckets.get_mut(key)?;
        if index >= records.len() {
            return None;
        }
        let record = records.remove(index);
        if records.is_empty() {
            self.buckets.remove(key);
        }
        Some(record)
    }
}
