//! Hands-free voice turn-taking for a spoken interview.
//!
//! The microphone is sampled continuously; an energy threshold with a
//! silence hysteresis decides when the candidate starts and stops talking.
//! Each finished utterance is encoded and sent over a WebSocket to the
//! interview service, whose spoken replies are played back while the
//! candidate's own speech is suppressed.
//!
//! * [`audio`]     capture, loudness, segmentation, encoding
//! * [`playback`]  reply playback and far-end activity
//! * [`transport`] WebSocket link and wire messages
//! * [`engine`]    the turn controller and its event loop
//! * [`config`]    `settings.toml`

pub mod audio;
pub mod config;
pub mod engine;
pub mod playback;
pub mod transport;
