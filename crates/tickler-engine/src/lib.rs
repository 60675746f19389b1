//! `tickler-engine` — reminder scheduling and notification coalescing.
//!
//! # Overview
//!
//! The engine watches a live collection of tasks (delivered as successive
//! snapshots by an external data layer), arms precise cancellable timers for
//! reminders due in the future, and folds near-simultaneous firings into a
//! single user-facing display event with a stable ordering. All state lives
//! in one task driven by [`engine::ReminderEngine::run`]; embedders interact
//! through a cloneable [`engine::TicklerHandle`].
//!
//! # Components
//!
//! | Module      | Responsibility                                         |
//! |-------------|--------------------------------------------------------|
//! | `types`     | `ReminderRecord` + `TimerState` + `DisplayGroup`       |
//! | `registry`  | bucket-keyed record store, register/unregister/update  |
//! | `timer`     | one-shot timer tasks, deferral, cancellation           |
//! | `coalesce`  | debounced batching and display merge rules             |
//! | `reconcile` | snapshot diffing into add/remove/modify events         |
//! | `host`      | notification/badge port to the host environment        |
//! | `engine`    | the event loop tying everything together               |

pub mod coalesce;
pub mod engine;
pub mod error;
pub mod host;
pub mod reconcile;
pub mod registry;
pub mod timer;
pub mod types;

pub use coalesce::NotificationCoalescer;
pub use engine::{ReminderEngine, TicklerHandle};
pub use error::{EngineError, Result};
pub use host::{HostPort, NullHost};
pub use reconcile::{SyncReconciler, TaskChange};
pub use registry::ReminderRegistry;
pub use timer::TimerController;
pub use types::{DisplayGroup, ReminderRecord, TimerState};
