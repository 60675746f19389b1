//! Snapshot diffing.
//!
//! The data layer hands the engine whole point-in-time task lists; this
//! module turns consecutive snapshots into add/remove/modify events, in
//! snapshot order so downstream effects are deterministic.

use std::collections::{HashMap, HashSet};

use tickler_core::types::{Task, TaskId};

/// One difference between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskChange {
    Added(Task),
    Removed(TaskId),
    Modified(Task),
}

/// Diffs successive snapshots of the external task collection.
#[derive(Default)]
pub struct SyncReconciler {
    previous: Vec<Task>,
}

impl SyncReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a new snapshot against the previous one and adopt it.
    ///
    /// Removals are reported first (in previous-snapshot order), then
    /// additions and deep-inequality modifications in new-snapshot order.
    pub fn diff(&mut self, snapshot: Vec<Task>) -> Vec<TaskChange> {
        let prev_by_id: HashMap<&TaskId, &Task> =
            self.previous.iter().map(|t| (&t.id, t)).collect();
        let next_ids: HashSet<&TaskId> = snapshot.iter().map(|t| &t.id).collect();

        let mut changes = Vec::new();
        for prev in &self.previous {
            if !next_ids.contains(&prev.id) {
                changes.push(TaskChange::Removed(prev.id.clone()));
            }
        }
        for task in &snapshot {
            match prev_by_id.get(&task.id) {
                None => changes.push(TaskChange::Added(task.clone())),
                Some(prev) if *prev != task => changes.push(TaskChange::Modified(task.clone())),
                Some(_) => {}
            }
        }

        self.previous = snapshot;
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickler_core::types::{Priority, TaskStatus};

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: id.into(),
            title: title.to_string(),
            priority: Priority::Medium,
            status: TaskStatus::Open,
            reminder_at: None,
            reminder_all_day: None,
        }
    }

    #[test]
    fn first_snapshot_is_all_additions() {
        let mut reconciler = SyncReconciler::new();
        let changes = reconciler.diff(vec![task("a", "one"), task("b", "two")]);
        assert_eq!(
            changes,
            vec![
                TaskChange::Added(task("a", "one")),
                TaskChange::Added(task("b", "two")),
            ]
        );
    }

    #[test]
    fn detects_removal_modification_and_addition() {
        let mut reconciler = SyncReconciler::new();
        reconciler.diff(vec![task("a", "one"), task("b", "two")]);

        let changes = reconciler.diff(vec![task("b", "two edited"), task("c", "three")]);
        assert_eq!(
            changes,
            vec![
                TaskChange::Removed("a".into()),
                TaskChange::Modified(task("b", "two edited")),
                TaskChange::Added(task("c", "three")),
            ]
        );
    }

    #[test]
    fn identical_snapshot_yields_nothing() {
        let mut reconciler = SyncReconciler::new();
        reconciler.diff(vec![task("a", "one")]);
        assert!(reconciler.diff(vec![task("a", "one")]).is_empty());
    }
}
