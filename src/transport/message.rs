//! JSON messages exchanged with the interview service over `/ws/chat`.
//!
//! ```text
//! client → server  {"type":"audio","payload":"<base64>","job_role":..,
//!                   "company_context":..,"job_description":..,"interview_step":n}
//! server → client  {"type":"audio","text":..,"interview_step":n,"is_finished":b,
//!                   "feedback":s|null,"audio":"<base64 mp3>"|null}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::websocket::TransportError;
use crate::config::InterviewConfig;

const AUDIO_KIND: &str = "audio";

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Interview parameters sent alongside every segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub job_role: String,
    pub company_context: String,
    pub job_description: String,
}

impl From<&InterviewConfig> for SessionContext {
    fn from(cfg: &InterviewConfig) -> Self {
        Self {
            job_role: cfg.job_role.clone(),
            company_context: cfg.company_context.clone(),
            job_description: cfg.job_description.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutboundMessage
// ---------------------------------------------------------------------------

/// One finished speech segment, ready for the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    /// Base64 of the encoded segment.
    pub payload: String,
    pub job_role: String,
    pub company_context: String,
    pub job_description: String,
    pub interview_step: u32,
}

impl OutboundMessage {
    pub fn audio(encoded: &[u8], context: &SessionContext, interview_step: u32) -> Self {
        Self {
            kind: AUDIO_KIND.to_string(),
            payload: STANDARD.encode(encoded),
            job_role: context.job_role.clone(),
            company_context: context.company_context.clone(),
            job_description: context.job_description.clone(),
            interview_step,
        }
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    interview_step: u32,
    #[serde(default)]
    is_finished: bool,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    audio: Option<String>,
}

/// A decoded reply from the interviewer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub text: String,
    pub interview_step: u32,
    pub finished: bool,
    /// Closing feedback; blank strings are normalized to `None`.
    pub feedback: Option<String>,
    /// Synthesized speech (MP3), if the reply carries any.
    pub audio: Option<Vec<u8>>,
}

impl Reply {
    pub fn has_audio(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.is_empty())
    }
}

/// Parse one inbound text frame.
///
/// Returns `Ok(None)` for well-formed messages of a type other than `audio`.
pub fn parse_reply(text: &str) -> Result<Option<Reply>, TransportError> {
    let wire: WireReply =
        serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))?;

    if wire.kind != AUDIO_KIND {
        log::debug!("transport: ignoring '{}' message", wire.kind);
        return Ok(None);
    }

    let audio = match wire.audio.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(b64) => Some(
            STANDARD
                .decode(b64)
                .map_err(|e| TransportError::Decode(format!("reply audio: {e}")))?,
        ),
    };

    Ok(Some(Reply {
        text: wire.text,
        interview_step: wire.interview_step,
        finished: wire.is_finished,
        feedback: wire.feedback.filter(|f| !f.trim().is_empty()),
        audio,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
