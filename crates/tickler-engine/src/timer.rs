//! One-shot timer arming, deferral, and cancellation.
//!
//! Each `Scheduled` record is backed by a spawned task that sleeps until the
//! record's effective fire time and then reports the id back to the engine
//! loop. Records whose fire time lies beyond the direct horizon are marked
//! `Deferred` and revisited by the engine's re-arm tick instead of holding a
//! live timer for days.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tickler_core::types::TaskId;

use crate::types::{ReminderRecord, TimerState};

/// A single timer firing.
///
/// The generation stamps one arming: the engine only honours a firing whose
/// generation matches the controller's current arming for that id, so a
/// firing that raced a cancellation or re-arm is dropped on the floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFire {
    pub id: TaskId,
    pub generation: u64,
}

/// Owns every live timer task and all timer-state transitions.
pub struct TimerController {
    fired_tx: mpsc::Sender<TimerFire>,
    armed: HashMap<TaskId, (u64, JoinHandle<()>)>,
    next_generation: u64,
    max_direct_delay: Duration,
}

impl TimerController {
    pub fn new(max_direct_delay: Duration, fired_tx: mpsc::Sender<TimerFire>) -> Self {
        Self {
            fired_tx,
            armed: HashMap::new(),
            next_generation: 0,
            max_direct_delay,
        }
    }

    /// Arm a record, replacing any previous timer for the same id.
    ///
    /// Transitions: already due → stays `Idle` (picked up on the next
    /// due-groups query); within the horizon → `Scheduled` with a live
    /// one-shot timer; beyond the horizon → `Deferred`.
    pub fn arm(&mut self, record: &mut ReminderRecord, now: DateTime<Utc>) {
        self.cancel(&record.id);
        record.timer_state = TimerState::Idle;

        let delay = record.effective_fire_time() - now;
        if delay < chrono::Duration::zero() {
            // Immediately eligible; no timer needed.
            return;
        }
        let delay = match delay.to_std() {
            Ok(d) => d,
            Err(_) => return,
        };
        if delay > self.max_direct_delay {
            record.timer_state = TimerState::Deferred;
            debug!(task_id = %record.id, delay_secs = delay.as_secs(), "reminder deferred");
            return;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let fire = TimerFire {
            id: record.id.clone(),
            generation,
        };
        let tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Send fails only when the engine is already gone.
            let _ = tx.send(fire).await;
        });
        self.armed.insert(record.id.clone(), (generation, handle));
        record.timer_state = TimerState::Scheduled;
        debug!(task_id = %record.id, delay_ms = delay.as_millis() as u64, "timer armed");
    }

    /// Abort any live timer for the id. A cancelled timer never fires: even
    /// if its task already pushed a firing, the stale generation is rejected
    /// by [`acknowledge`](Self::acknowledge).
    pub fn cancel(&mut self, id: &TaskId) {
        if let Some((_, handle)) = self.armed.remove(id) {
            handle.abort();
        }
    }

    /// Validate a firing against the current arming and retire its handle.
    /// Returns `false` for stale firings, which the engine must ignore.
    pub fn acknowledge(&mut self, fire: &TimerFire) -> bool {
        match self.armed.get(&fire.id) {
            Some((generation, _)) if *generation == fire.generation => {
                self.armed.remove(&fire.id);
                true
            }
            _ => {
                warn!(task_id = %fire.id, "stale timer firing ignored");
                false
            }
        }
    }

    /// Abort every live timer. Called once at engine teardown.
    pub fn shutdown(&mut self) {
        for (_, (_, handle)) in self.armed.drain() {
            handle.abort();
        }
    }
}
