use thiserror::Error;

/// Errors surfaced by the engine subsystem.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A handle call raced engine shutdown; the event loop is gone.
    #[error("Engine channel closed")]
    ChannelClosed,

    /// The host notification/badge collaborator failed. Isolated to the
    /// output step; never corrupts registry or display state.
    #[error("Host signal error: {0}")]
    Host(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
