//! Turn state and the status snapshot shared with front ends.
//!
//! [`TurnState`] is the controller's arbitration state.  [`EngineStatus`] is
//! the externally observable summary (listening, speaking, volume, turn,
//! far-end activity, conversation cursor, last error), published behind
//! [`SharedStatus`] after every event the engine handles.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::transport::Reply;

// ---------------------------------------------------------------------------
// TurnState
// ---------------------------------------------------------------------------

/// Whose turn it is.
///
/// ```text
/// WaitingForUser ──speech──▶ UserSpeaking ──segment sent──▶ AwaitingReply
///       ▲                        │ (too short)                  │ reply
///       │◀───────────────────────┘                              ▼
///       │◀──────────── playback done / no audio ──────── AiSpeaking
/// any ──stop / finished / terminal transport error──▶ SessionEnded
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnState {
    #[default]
    WaitingForUser,
    UserSpeaking,
    AwaitingReply,
    AiSpeaking,
    /// Terminal.
    SessionEnded,
}

impl TurnState {
    /// Whether user speech is ignored in this state.
    ///
    /// ```
    /// use interview_voice::engine::TurnState;
    ///
    /// assert!(!TurnState::WaitingForUser.suppresses_user());
    /// assert!(!TurnState::UserSpeaking.suppresses_user());
    /// assert!(TurnState::AwaitingReply.suppresses_user());
    /// assert!(TurnState::AiSpeaking.suppresses_user());
    /// assert!(TurnState::SessionEnded.suppresses_user());
    /// ```
    pub fn suppresses_user(&self) -> bool {
        matches!(
            self,
            TurnState::AwaitingReply | TurnState::AiSpeaking | TurnState::SessionEnded
        )
    }

    pub fn is_ended(&self) -> bool {
        *self == TurnState::SessionEnded
    }

    pub fn label(&self) -> &'static str {
        match self {
            TurnState::WaitingForUser => "Your turn",
            TurnState::UserSpeaking => "Listening",
            TurnState::AwaitingReply => "Thinking",
            TurnState::AiSpeaking => "Interviewer speaking",
            TurnState::SessionEnded => "Interview ended",
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationCursor
// ---------------------------------------------------------------------------

/// Progress through the interview, as reported by the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationCursor {
    /// Step echoed back with the next segment.
    pub step: u32,
    pub finished: bool,
    /// Closing feedback; kept once received.
    pub feedback: Option<String>,
    pub last_text: Option<String>,
}

impl ConversationCursor {
    /// Fold an inbound reply into the cursor.
    pub fn apply(&mut self, reply: &Reply) {
        self.step = reply.interview_step;
        self.finished |= reply.finished;
        if reply.feedback.is_some() {
            self.feedback = reply.feedback.clone();
        }
        if !reply.text.is_empty() {
            self.last_text = Some(reply.text.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// EngineStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStatus {
    /// Microphone held and frames flowing.
    pub listening: bool,
    /// Segmenter is in its speaking state.
    pub speaking: bool,
    /// Loudness of the most recent frame, `[0, 1]`.
    pub volume: f32,
    pub turn: TurnState,
    pub far_end_active: bool,
    pub cursor: ConversationCursor,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// SharedStatus
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`EngineStatus`].
///
/// Lock for a short critical section only; never hold it across `.await`.
pub type SharedStatus = Arc<Mutex<EngineStatus>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(Mutex::new(EngineStatus::default()))
}

/// Lock `status`, recovering the data if a previous holder panicked.
pub fn lock_status(status: &SharedStatus) -> MutexGuard<'_, EngineStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
