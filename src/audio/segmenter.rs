//! Speech/silence segmentation with a hysteresis timer.
//!
//! [`SpeechSegmenter`] is a two-state machine fed one loudness value per
//! analysis frame.  A value strictly above `min_volume` is speech; anything
//! else (including a value exactly equal to the threshold) is silence.
//!
//! ```text
//! Idle ──volume > min──▶ Speaking                      emit SpeechStarted
//! Speaking ──volume > min──▶ Speaking                  cancel pending timer
//! Speaking ──volume ≤ min, no timer──▶ Speaking        arm SilenceTimer
//! Speaking ──SilenceTimer fires──▶ Idle                emit SpeechEnded
//! ```
//!
//! The timer is a [`SilenceTimer`]: a single optional [`TimerHandle`] whose
//! only mutator, [`SilenceTimer::rearm`], cancels before it sets.  Firings
//! are delivered as a [`TimerId`] through a callback, normally into the
//! engine's event queue, and the segmenter acts on a firing only when the id
//! matches the timer it still considers pending.

use std::sync::Arc;
use std::time::Duration;

use crate::config::VadConfig;

// ---------------------------------------------------------------------------
// SilenceTimer
// ---------------------------------------------------------------------------

/// Identifies one arming of the [`SilenceTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Receives the id of a timer that has elapsed.
pub type TimerCallback = Arc<dyn Fn(TimerId) + Send + Sync>;

/// A live, cancellable timer task.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    abort: tokio::task::AbortHandle,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    fn cancel(self) {
        self.abort.abort();
    }
}

/// Single-shot, cancellable timer with at most one live instance.
///
/// Must be armed from inside a tokio runtime.
pub struct SilenceTimer {
    pending: Option<TimerHandle>,
    next_id: u64,
    on_fire: TimerCallback,
}

impl SilenceTimer {
    pub fn new(on_fire: TimerCallback) -> Self {
        Self {
            pending: None,
            next_id: 0,
            on_fire,
        }
    }

    /// Cancel any pending timer, then arm a new one for `delay`.
    pub fn rearm(&mut self, delay: Duration) -> TimerId {
        if let Some(prev) = self.pending.take() {
            prev.cancel();
        }

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let on_fire = Arc::clone(&self.on_fire);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(id);
        });

        self.pending = Some(TimerHandle {
            id,
            abort: task.abort_handle(),
        });
        id
    }

    /// Cancel the pending timer.  Returns `true` if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Accept a firing.  Returns `true` only when `id` is the pending timer;
    /// the timer is then no longer pending.
    pub fn take_fired(&mut self, id: TimerId) -> bool {
        match &self.pending {
            Some(handle) if handle.id() == id => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for SilenceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// SpeechState / SegmenterEvent
// ---------------------------------------------------------------------------

/// Raw acoustic activity as seen by the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechState {
    #[default]
    Idle,
    Speaking,
}

/// Transitions reported by [`SpeechSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterEvent {
    SpeechStarted,
    SpeechEnded,
}

// ---------------------------------------------------------------------------
// SpeechSegmenter
// ---------------------------------------------------------------------------

/// Energy-threshold speech segmenter.
pub struct SpeechSegmenter {
    config: VadConfig,
    state: SpeechState,
    timer: SilenceTimer,
}

impl SpeechSegmenter {
    pub fn new(config: VadConfig, on_timer: TimerCallback) -> Self {
        Self {
            config,
            state: SpeechState::Idle,
            timer: SilenceTimer::new(on_timer),
        }
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == SpeechState::Speaking
    }

    pub fn timer_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Replace the thresholds.  Takes effect from the next sample; a timer
    /// already armed keeps its original deadline.
    pub fn set_config(&mut self, config: VadConfig) {
        self.config = config;
    }

    /// Feed one loudness sample.
    pub fn on_volume(&mut self, volume: f32) -> Option<SegmenterEvent> {
        let is_speech = volume > self.config.min_volume;

        match (self.state, is_speech) {
            (SpeechState::Idle, true) => {
                self.timer.cancel();
                self.state = SpeechState::Speaking;
                log::debug!("segmenter: speech started (volume {volume:.3})");
                Some(SegmenterEvent::SpeechStarted)
            }
            (SpeechState::Idle, false) => None,
            (SpeechState::Speaking, true) => {
                if self.timer.cancel() {
                    log::trace!("segmenter: pause ended before hysteresis elapsed");
                }
                None
            }
            (SpeechState::Speaking, false) => {
                if !self.timer.is_pending() {
                    self.timer.rearm(self.config.silence_duration());
                }
                None
            }
        }
    }

    /// Handle a timer firing.  Stale ids are ignored.
    pub fn on_timer(&mut self, id: TimerId) -> Option<SegmenterEvent> {
        if !self.timer.take_fired(id) {
            log::trace!("segmenter: ignoring stale timer {id:?}");
            return None;
        }
        if self.state != SpeechState::Speaking {
            return None;
        }
        self.state = SpeechState::Idle;
        log::debug!("segmenter: speech ended");
        Some(SegmenterEvent::SpeechEnded)
    }

    /// Cancel the timer and return to `Idle` without emitting anything.
    pub fn reset(&mut self) {
        self.timer.cancel();
        self.state = SpeechState::Idle;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
