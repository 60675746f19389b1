use async_trait::async_trait;

use tickler_core::notify::{BadgeState, NotifyRequest};

use crate::error::EngineError;

/// Port to the host environment's notification surface (sound cue, dock or
/// tray badge). Supplied by the embedder.
///
/// Implementations must be `Send + Sync`: the engine holds one behind a
/// `Box` and calls it from its event-loop task. Failures are logged and
/// isolated; they never corrupt scheduling state or suppress future
/// firings.
#[async_trait]
pub trait HostPort: Send + Sync {
    /// Play the reminder cue. Invoked at most once per display change that
    /// introduces a new bucket key.
    async fn notify(&self, request: &NotifyRequest) -> Result<(), EngineError>;

    /// Mirror the displayed-record count while the reminders view is not
    /// focused.
    async fn set_badge(&self, badge: &BadgeState) -> Result<(), EngineError>;
}

/// Host integration that swallows every signal. Useful headless and in
/// tests.
pub struct NullHost;

#[async_trait]
impl HostPort for NullHost {
    async fn notify(&self, _request: &NotifyRequest) -> Result<(), EngineError> {
        Ok(())
    }

    async fn set_badge(&self, _badge: &BadgeState) -> Result<(), EngineError> {
        Ok(())
    }
}
