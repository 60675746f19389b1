use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tickler_core::bucket::{self, BucketKey};
use tickler_core::types::{Priority, Task, TaskId, TaskStatus};

/// Scheduling lifecycle of a reminder record.
///
/// Normal path: `Idle → Scheduled → Fired`. Far-future path:
/// `Idle → Deferred → Scheduled → Fired`. Cancellation resets to `Idle`
/// before any new arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    /// No timer armed. Past-due records stay Idle until queried.
    #[default]
    Idle,
    /// A live one-shot timer holds this record's fire time.
    Scheduled,
    /// Fire time beyond the direct horizon; revisited by the re-arm tick.
    Deferred,
    /// The reminder has come due.
    Fired,
}

/// A task projected into the scheduler.
///
/// Records exist only for tasks that currently carry a reminder, so
/// `reminder_at` is non-optional here. Records are value objects: an update
/// rebuilds the record from the new task payload and re-derives its
/// scheduling state rather than mutating the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRecord {
    pub id: TaskId,
    pub title: String,
    pub priority: Priority,
    pub status: TaskStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub reminder_at: DateTime<Utc>,
    pub all_day: bool,
    #[serde(default)]
    pub timer_state: TimerState,
}

impl ReminderRecord {
    /// Project a task into a record. `None` when the task has no reminder.
    pub fn from_task(task: &Task) -> Option<Self> {
        let reminder_at = task.reminder_at?;
        Some(Self {
            id: task.id.clone(),
            title: task.title.clone(),
            priority: task.priority,
            status: task.status,
            reminder_at,
            all_day: task.reminder_all_day.unwrap_or(false),
            timer_state: TimerState::Idle,
        })
    }

    pub fn bucket_key(&self) -> BucketKey {
        BucketKey::derive(self.reminder_at, self.all_day)
    }

    /// Local midnight for all-day reminders, the raw timestamp otherwise.
    pub fn effective_fire_time(&self) -> DateTime<Utc> {
        bucket::effective_fire_time(self.reminder_at, self.all_day)
    }

    /// Individually due: fired already, or past its effective fire time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.timer_state == TimerState::Fired || self.effective_fire_time() <= now
    }
}

/// One displayed group of reminders sharing a bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayGroup {
    pub bucket_key: BucketKey,
    pub records: Vec<ReminderRecord>,
}
