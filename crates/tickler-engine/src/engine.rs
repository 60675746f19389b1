//! The engine event loop and its public handle.
//!
//! All scheduling state lives inside one task: registry and coalescer
//! mutations run to completion within a single branch of the loop's
//! `select!`, so no locking is needed anywhere. Embedders talk to the loop
//! through a cloneable [`TicklerHandle`] and observe the display state on a
//! `watch` channel.

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tickler_core::config::TicklerConfig;
use tickler_core::notify::{BadgeState, NotifyRequest};
use tickler_core::types::{Task, TaskId};

use crate::coalesce::NotificationCoalescer;
use crate::error::{EngineError, Result};
use crate::host::HostPort;
use crate::reconcile::{SyncReconciler, TaskChange};
use crate::registry::ReminderRegistry;
use crate::timer::{TimerController, TimerFire};
use crate::types::{DisplayGroup, ReminderRecord};

const COMMAND_BUFFER: usize = 64;
const FIRING_BUFFER: usize = 256;

enum Command {
    Snapshot(Vec<Task>),
    Register(Task),
    Unregister(TaskId),
    Update(Task),
    DueGroups {
        reply: oneshot::Sender<Vec<DisplayGroup>>,
    },
    Dismiss,
    ViewFocus(bool),
}

/// Cloneable client for a running [`ReminderEngine`].
///
/// Every method is a message to the engine task; calls fail with
/// [`EngineError::ChannelClosed`] once the loop has shut down.
#[derive(Clone)]
pub struct TicklerHandle {
    cmd_tx: mpsc::Sender<Command>,
    display_rx: watch::Receiver<Vec<DisplayGroup>>,
}

impl TicklerHandle {
    /// Feed a fresh point-in-time snapshot of the task collection. The
    /// engine diffs it against the previous snapshot itself.
    pub async fn apply_snapshot(&self, tasks: Vec<Task>) -> Result<()> {
        self.send(Command::Snapshot(tasks)).await
    }

    /// Register a single task's reminder directly.
    pub async fn register(&self, task: Task) -> Result<()> {
        self.send(Command::Register(task)).await
    }

    /// Remove a task's reminder. Unknown ids are a benign no-op.
    pub async fn unregister(&self, id: TaskId) -> Result<()> {
        self.send(Command::Unregister(id)).await
    }

    /// Replace a task's reminder with a re-derived schedule.
    pub async fn update(&self, task: Task) -> Result<()> {
        self.send(Command::Update(task)).await
    }

    /// Currently-due groups, ascending by bucket key.
    pub async fn due_groups(&self) -> Result<Vec<DisplayGroup>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::DueGroups { reply: tx }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Clear the display without touching registry contents.
    pub async fn dismiss(&self) -> Result<()> {
        self.send(Command::Dismiss).await
    }

    /// Tell the engine whether the dedicated reminders view is focused.
    /// Focusing it lowers a raised badge.
    pub async fn set_view_focus(&self, focused: bool) -> Result<()> {
        self.send(Command::ViewFocus(focused)).await
    }

    /// Watch the ordered display state. An empty list means nothing to
    /// show.
    pub fn display(&self) -> watch::Receiver<Vec<DisplayGroup>> {
        self.display_rx.clone()
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// One logical scheduler per running session.
pub struct ReminderEngine {
    cmd_rx: mpsc::Receiver<Command>,
    fired_rx: mpsc::Receiver<TimerFire>,
    core: EngineCore,
}

impl ReminderEngine {
    pub fn new(config: &TicklerConfig, host: Box<dyn HostPort>) -> (Self, TicklerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (fired_tx, fired_rx) = mpsc::channel(FIRING_BUFFER);
        let (display_tx, display_rx) = watch::channel(Vec::new());

        let engine = Self {
            cmd_rx,
            fired_rx,
            core: EngineCore {
                registry: ReminderRegistry::new(),
                timers: TimerController::new(config.max_direct_delay(), fired_tx),
                coalescer: NotificationCoalescer::new(config.coalesce_window()),
                reconciler: SyncReconciler::new(),
                host,
                display_tx,
                rearm_interval: config.rearm_interval(),
                rearm_at: None,
                view_focused: false,
                badge_raised: false,
            },
        };
        (engine, TicklerHandle { cmd_tx, display_rx })
    }

    /// Main event loop. Runs until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("reminder engine started");
        let Self {
            mut cmd_rx,
            mut fired_rx,
            mut core,
        } = self;

        loop {
            let flush_at = core.coalescer.deadline();
            let rearm_at = core.rearm_at;
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => core.handle_command(cmd).await,
                Some(fire) = fired_rx.recv() => core.handle_fired(fire),
                _ = sleep_until_opt(flush_at) => core.flush().await,
                _ = sleep_until_opt(rearm_at) => core.rearm_tick(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder engine shutting down");
                        break;
                    }
                }
            }
        }
        core.teardown();
    }
}

/// State owned by the engine task.
struct EngineCore {
    registry: ReminderRegistry,
    timers: TimerController,
    coalescer: NotificationCoalescer,
    reconciler: SyncReconciler,
    host: Box<dyn HostPort>,
    display_tx: watch::Sender<Vec<DisplayGroup>>,
    rearm_interval: std::time::Duration,
    rearm_at: Option<Instant>,
    view_focused: bool,
    badge_raised: bool,
}

impl EngineCore {
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Snapshot(tasks) => self.apply_snapshot(tasks),
            Command::Register(task) => {
                self.register_task(&task);
                self.refresh_rearm();
            }
            Command::Unregister(id) => {
                self.unregister_task(&id);
                self.refresh_rearm();
            }
            Command::Update(task) => {
                self.update_task(&task);
                self.refresh_rearm();
            }
            Command::DueGroups { reply } => {
                let _ = reply.send(self.registry.due_groups(Utc::now()));
            }
            Command::Dismiss => self.dismiss().await,
            Command::ViewFocus(focused) => self.set_view_focus(focused).await,
        }
    }

    /// Diff a snapshot and drive the registry with the result.
    fn apply_snapshot(&mut self, tasks: Vec<Task>) {
        let changes = self.reconciler.diff(tasks);
        if !changes.is_empty() {
            debug!(changes = changes.len(), "snapshot diffed");
        }
        for change in changes {
            match change {
                TaskChange::Added(task) => self.register_task(&task),
                TaskChange::Removed(id) => self.unregister_task(&id),
                TaskChange::Modified(task) => self.update_task(&task),
            }
        }
        self.refresh_rearm();
    }

    fn register_task(&mut self, task: &Task) {
        if let Some(record) = ReminderRecord::from_task(task) {
            self.registry.register(record, &mut self.timers, Utc::now());
        }
    }

    fn unregister_task(&mut self, id: &TaskId) {
        self.registry.unregister(id, &mut self.timers);
        self.coalescer.forget(id);
    }

    fn update_task(&mut self, task: &Task) {
        let was_displayed = self.coalescer.is_displayed(&task.id);
        match ReminderRecord::from_task(task) {
            Some(record) => {
                self.registry
                    .update(record.clone(), &mut self.timers, Utc::now());
                self.coalescer.forget(&task.id);
                if was_displayed {
                    // Refresh the on-screen entry right away. A closed
                    // display is never opened by a mere edit; that takes a
                    // genuine firing.
                    let shown = self.registry.get(&task.id).cloned().unwrap_or(record);
                    self.coalescer.push(shown);
                }
            }
            None => {
                // Reminder cleared from the task.
                self.registry.unregister(&task.id, &mut self.timers);
                self.coalescer.forget(&task.id);
            }
        }
    }

    fn handle_fired(&mut self, fire: TimerFire) {
        if !self.timers.acknowledge(&fire) {
            // Cancelled or re-armed since; the firing is void.
            return;
        }
        match self.registry.mark_fired(&fire.id) {
            Some(record) => {
                debug!(task_id = %fire.id, "reminder fired");
                self.coalescer.push(record);
            }
            None => debug!(task_id = %fire.id, "firing for unregistered reminder ignored"),
        }
    }

    async fn flush(&mut self) {
        let outcome = self.coalescer.flush(&mut self.registry, Utc::now());
        if outcome.display_changed {
            self.publish(outcome.introduced_bucket).await;
        }
    }

    /// Push the display state outward and settle the host signals owed.
    async fn publish(&mut self, introduced_bucket: bool) {
        let groups = self.coalescer.display().to_vec();
        let count = self.coalescer.displayed_count();
        self.display_tx.send_replace(groups);

        if introduced_bucket {
            if let Err(e) = self.host.notify(&NotifyRequest::sound_only()).await {
                warn!(error = %e, "host notification failed");
            }
        }
        if !self.view_focused && count > 0 {
            self.badge_raised = true;
            if let Err(e) = self.host.set_badge(&BadgeState::raised(count)).await {
                warn!(error = %e, "badge update failed");
            }
        } else if self.badge_raised && count == 0 {
            self.badge_raised = false;
            if let Err(e) = self.host.set_badge(&BadgeState::cleared()).await {
                warn!(error = %e, "badge clear failed");
            }
        }
    }

    async fn dismiss(&mut self) {
        if self.coalescer.dismiss() {
            info!("reminder display dismissed");
            self.publish(false).await;
        }
    }

    async fn set_view_focus(&mut self, focused: bool) {
        self.view_focused = focused;
        if focused && self.badge_raised {
            self.badge_raised = false;
            if let Err(e) = self.host.set_badge(&BadgeState::cleared()).await {
                warn!(error = %e, "badge clear failed");
            }
        }
    }

    /// Re-attempt arming for every deferred record, then reschedule the
    /// tick if any remain deferred.
    fn rearm_tick(&mut self) {
        let now = Utc::now();
        let ids = self.registry.deferred_ids();
        debug!(deferred = ids.len(), "re-arm tick");
        for id in ids {
            if let Some(record) = self.registry.get_mut(&id) {
                self.timers.arm(record, now);
            }
        }
        self.rearm_at = None;
        self.refresh_rearm();
    }

    /// The re-arm tick runs exactly while deferred records exist.
    fn refresh_rearm(&mut self) {
        if self.registry.has_deferred() {
            if self.rearm_at.is_none() {
                self.rearm_at = Some(Instant::now() + self.rearm_interval);
            }
        } else {
            self.rearm_at = None;
        }
    }

    fn teardown(&mut self) {
        self.timers.shutdown();
        self.coalescer.cancel();
        info!("reminder engine stopped");
    }
}

/// Sleep until the deadline, or forever when there is none. Keeps the
/// optional deadlines selectable without busy arms.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tickler_core::types::{Priority, TaskStatus};

    /// Host double that records every signal it receives.
    #[derive(Clone, Default)]
    struct RecordingHost {
        notifies: Arc<Mutex<Vec<NotifyRequest>>>,
        badges: Arc<Mutex<Vec<BadgeState>>>,
    }

    #[async_trait]
    impl HostPort for RecordingHost {
        async fn notify(&self, request: &NotifyRequest) -> crate::error::Result<()> {
            self.notifies.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn set_badge(&self, badge: &BadgeState) -> crate::error::Result<()> {
            self.badges.lock().unwrap().push(badge.clone());
            Ok(())
        }
    }

    /// Host double whose every call fails.
    struct FailingHost;

    #[async_trait]
    impl HostPort for FailingHost {
        async fn notify(&self, _request: &NotifyRequest) -> crate::error::Result<()> {
            Err(EngineError::Host("sound device unavailable".to_string()))
        }

        async fn set_badge(&self, _badge: &BadgeState) -> crate::error::Result<()> {
            Err(EngineError::Host("no badge surface".to_string()))
        }
    }

    fn test_config() -> TicklerConfig {
        TicklerConfig {
            max_direct_delay_secs: 3600,
            rearm_interval_secs: 1,
            coalesce_window_ms: 25,
        }
    }

    fn spawn_engine(
        config: TicklerConfig,
        host: Box<dyn HostPort>,
    ) -> (TicklerHandle, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let (engine, handle) = ReminderEngine::new(&config, host);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(engine.run(shutdown_rx));
        (handle, shutdown_tx, join)
    }

    fn task(id: &str, at: DateTime<Utc>, all_day: bool) -> Task {
        Task {
            id: id.into(),
            title: format!("task {id}"),
            priority: Priority::Medium,
            status: TaskStatus::Open,
            reminder_at: Some(at),
            reminder_all_day: Some(all_day),
        }
    }

    fn due_in_ms(ms: i64) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::milliseconds(ms)
    }

    #[tokio::test]
    async fn fired_reminder_opens_display_and_notifies_once() {
        let host = RecordingHost::default();
        let (handle, shutdown, join) = spawn_engine(test_config(), Box::new(host.clone()));

        handle
            .apply_snapshot(vec![task("a", due_in_ms(40), false)])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let groups = handle.display().borrow().clone();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].records[0].id.as_str(), "a");
        assert_eq!(host.notifies.lock().unwrap().len(), 1);
        assert_eq!(
            host.badges.lock().unwrap().last(),
            Some(&BadgeState::raised(1))
        );

        let _ = shutdown.send(true);
        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("engine loop should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn same_burst_coalesces_into_one_event() {
        let host = RecordingHost::default();
        let (handle, _shutdown, _join) = spawn_engine(test_config(), Box::new(host.clone()));

        let at = due_in_ms(40);
        handle
            .apply_snapshot(vec![task("a", at, false), task("b", at, false)])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let groups = handle.display().borrow().clone();
        assert_eq!(groups.len(), 1, "same minute means one group");
        assert_eq!(groups[0].records.len(), 2);
        // Two timers, one burst, one notification.
        assert_eq!(host.notifies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn late_arrival_appends_after_existing_groups() {
        let host = RecordingHost::default();
        let (handle, _shutdown, _join) = spawn_engine(test_config(), Box::new(host.clone()));

        // Two reminders already due this morning open the display together
        // when the first real timer fires.
        handle
            .apply_snapshot(vec![
                task("a", due_in_ms(40), false),
                task("b", due_in_ms(2_000_000), false),
            ])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.display().borrow().len(), 1);

        // C fires while the display is open: it lands at the very end,
        // never ahead of what is already showing. (Exact grouping depends
        // on whether C shares A's minute; ordering is pinned down by the
        // coalescer unit tests.)
        handle
            .apply_snapshot(vec![
                task("a", due_in_ms(-500), false),
                task("b", due_in_ms(2_000_000), false),
                task("c", due_in_ms(40), false),
            ])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let groups = handle.display().borrow().clone();
        let flat: Vec<_> = groups
            .iter()
            .flat_map(|g| g.records.iter())
            .map(|r| r.id.as_str().to_string())
            .collect();
        assert_eq!(flat.first().map(String::as_str), Some("a"));
        assert_eq!(flat.last().map(String::as_str), Some("c"));
        assert!(!host.notifies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rescheduling_cancels_the_old_timer() {
        let host = RecordingHost::default();
        let (handle, _shutdown, _join) = spawn_engine(test_config(), Box::new(host.clone()));

        handle
            .apply_snapshot(vec![task("a", due_in_ms(150), false)])
            .await
            .unwrap();
        // Move the reminder out before the old timer can fire.
        handle
            .apply_snapshot(vec![task("a", due_in_ms(60_000), false)])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(handle.display().borrow().is_empty());
        assert!(host.notifies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completing_a_displayed_task_updates_in_place_and_unregisters() {
        let host = RecordingHost::default();
        let (handle, _shutdown, _join) = spawn_engine(test_config(), Box::new(host.clone()));

        let at = due_in_ms(40);
        handle.apply_snapshot(vec![task("a", at, false)]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.display().borrow().len(), 1);

        let mut done = task("a", at, false);
        done.status = TaskStatus::Complete;
        handle.apply_snapshot(vec![done]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let groups = handle.display().borrow().clone();
        assert_eq!(groups[0].records[0].status, TaskStatus::Complete);
        assert!(handle.due_groups().await.unwrap().is_empty());

        // Dismissing must not let the completed task resurface.
        handle.dismiss().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.display().borrow().is_empty());
    }

    #[tokio::test]
    async fn edit_never_opens_a_closed_display() {
        let host = RecordingHost::default();
        let (handle, _shutdown, _join) = spawn_engine(test_config(), Box::new(host.clone()));

        handle
            .apply_snapshot(vec![task("a", due_in_ms(600_000), false)])
            .await
            .unwrap();
        let mut edited = task("a", due_in_ms(600_000), false);
        edited.title = "renamed".to_string();
        handle.apply_snapshot(vec![edited]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(handle.display().borrow().is_empty());
        assert!(host.notifies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deferred_reminder_is_promoted_by_the_rearm_tick() {
        let host = RecordingHost::default();
        let config = TicklerConfig {
            max_direct_delay_secs: 1,
            rearm_interval_secs: 1,
            coalesce_window_ms: 25,
        };
        let (handle, _shutdown, _join) = spawn_engine(config, Box::new(host.clone()));

        // 1.5 s out: beyond the 1 s horizon, so deferred at first, promoted
        // to a live timer by the tick, firing on schedule.
        handle
            .apply_snapshot(vec![task("a", due_in_ms(1_500), false)])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(handle.display().borrow().is_empty());

        tokio::time::sleep(Duration::from_millis(2_600)).await;
        let groups = handle.display().borrow().clone();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].records[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn focusing_the_view_clears_the_badge() {
        let host = RecordingHost::default();
        let (handle, _shutdown, _join) = spawn_engine(test_config(), Box::new(host.clone()));

        handle
            .apply_snapshot(vec![task("a", due_in_ms(40), false)])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(
            host.badges.lock().unwrap().last(),
            Some(&BadgeState::raised(1))
        );

        handle.set_view_focus(true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            host.badges.lock().unwrap().last(),
            Some(&BadgeState::cleared())
        );
    }

    #[tokio::test]
    async fn host_failures_do_not_block_future_firings() {
        let (handle, _shutdown, _join) = spawn_engine(test_config(), Box::new(FailingHost));

        handle
            .apply_snapshot(vec![task("a", due_in_ms(40), false)])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.display().borrow().len(), 1);

        handle
            .apply_snapshot(vec![
                task("a", due_in_ms(-500), false),
                task("b", due_in_ms(40), false),
            ])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let shown: usize = handle
            .display()
            .borrow()
            .iter()
            .map(|g| g.records.len())
            .sum();
        assert_eq!(shown, 2);
    }

    #[tokio::test]
    async fn handle_calls_fail_after_shutdown() {
        let (handle, shutdown, join) = spawn_engine(test_config(), Box::new(NullHost));
        let _ = shutdown.send(true);
        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("engine loop should exit")
            .unwrap();

        let err = handle.dismiss().await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
    }
}
