//! `tickler-core` — shared domain types for the tickler reminder engine.
//!
//! # Overview
//!
//! The engine crate (`tickler-engine`) schedules and coalesces reminder
//! notifications for tasks supplied by an external data layer. This crate
//! holds everything both sides of that boundary need to agree on:
//!
//! | Module   | Contents                                               |
//! |----------|--------------------------------------------------------|
//! | `types`  | `Task` snapshot row, `TaskId`, `Priority`, `TaskStatus` |
//! | `bucket` | `BucketKey` derivation and calendar-day predicates      |
//! | `notify` | `NotifyRequest` / `BadgeState` host-collaborator payloads |
//! | `config` | `TicklerConfig` (tickler.toml + `TICKLER_*` env)        |
//! | `error`  | `TicklerError` / `Result`                               |

pub mod bucket;
pub mod config;
pub mod error;
pub mod notify;
pub mod types;

pub use bucket::BucketKey;
pub use config::TicklerConfig;
pub use error::{Result, TicklerError};
pub use notify::{BadgeState, NotifyRequest};
pub use types::{Priority, Task, TaskId, TaskStatus};
