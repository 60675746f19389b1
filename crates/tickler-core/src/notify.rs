//! Host notification payloads, shared between the engine and whatever
//! host integration the embedder supplies (system notifications, dock
//! badge, tray counter).

use serde::{Deserialize, Serialize};

/// One outward notification cue, issued at most once per display change
/// that introduces a bucket key not previously shown.
///
/// The engine always asks for a sound cue without a popup; the rendered
/// reminder list is the popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub play_sound: bool,
    pub show_popup: bool,
}

impl NotifyRequest {
    /// The fixed cue used for reminder display changes.
    pub fn sound_only() -> Self {
        Self {
            play_sound: true,
            show_popup: false,
        }
    }
}

/// Badge/counter state mirrored to the host while the reminders view is
/// not focused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeState {
    pub show: bool,
    /// Total number of records currently displayed.
    pub count: usize,
}

impl BadgeState {
    pub fn raised(count: usize) -> Self {
        Self { show: true, count }
    }

    pub fn cleared() -> Self {
        Self { show: false, count: 0 }
    }
}
