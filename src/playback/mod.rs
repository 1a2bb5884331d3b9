//! Far-end audio: reply playback and the `far_end_active` flag.

pub mod monitor;
pub mod player;

pub use monitor::{PlaybackCallback, PlaybackId, PlaybackMonitor, PlaybackStart};
pub use player::{AudioPlayer, PlaybackDone, PlaybackError, PlaybackHandle, RodioPlayer};
