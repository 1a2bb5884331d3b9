//! Turn arbitration between the candidate and the interviewer.
//!
//! [`TurnController`] owns every stateful component (segmenter, capture
//! session, playback monitor, transport) and applies one [`EngineEvent`] at
//! a time:
//!
//! | Turn                        | Event                              | Effect                                   |
//! |-----------------------------|------------------------------------|------------------------------------------|
//! | WaitingForUser              | speech started, not suppressed     | → UserSpeaking                           |
//! | WaitingForUser/UserSpeaking | speech ended, segment ≥ min bytes  | send; → AwaitingReply                    |
//! | WaitingForUser/UserSpeaking | speech ended, segment < min bytes  | discard; → WaitingForUser                |
//! | any                         | reply with audio                   | play; → AiSpeaking                       |
//! | any                         | reply without audio                | → WaitingForUser (ended if finished)     |
//! | AiSpeaking                  | playback finished                  | → WaitingForUser (ended if finished)     |
//! | any                         | recoverable transport error        | report; AwaitingReply → WaitingForUser   |
//! | any                         | terminal transport error, or stop  | teardown; → SessionEnded                 |
//!
//! User speech is suppressed while the far end is playing, while the turn is
//! AwaitingReply or AiSpeaking, and once the interview is finished.  The
//! microphone keeps recording through suppression so a segment that outlives
//! it needs no restart, but a segment that ends while suppressed is dropped.
//!
//! Device calls that can stall never run here: the microphone is opened on
//! the blocking pool ([`EngineEvent::MicrophoneReady`] brings the handle
//! back) and playback outcomes arrive as [`EngineEvent::PlaybackFinished`].

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::state::{lock_status, ConversationCursor, SharedStatus, TurnState};
use super::{DiscardReason, EngineCommand, EngineError, EngineEvent, EngineNotice, Outputs};
use crate::audio::{
    AudioFrame, CaptureError, CaptureSession, EnergyAnalyzer, FrameSink, Microphone,
    OpenedMicrophone, SegmenterEvent, SpeechSegmenter, TimerCallback, TimerId,
};
use crate::config::{AppConfig, VadConfig};
use crate::playback::{
    AudioPlayer, PlaybackCallback, PlaybackError, PlaybackId, PlaybackMonitor, PlaybackStart,
};
use crate::transport::{
    OutboundMessage, Reply, SessionContext, Transport, TransportError, TransportEvent,
};

pub struct TurnController {
    turn: TurnState,
    listening: bool,
    /// A microphone open is in flight on the blocking pool.
    acquiring: bool,
    analyzer: EnergyAnalyzer,
    segmenter: SpeechSegmenter,
    session: CaptureSession,
    monitor: PlaybackMonitor,
    transport: Box<dyn Transport>,
    context: SessionContext,
    cursor: ConversationCursor,
    min_segment_bytes: usize,
    max_send_failures: u32,
    send_failures: u32,
    last_error: Option<String>,
    events: mpsc::UnboundedSender<EngineEvent>,
    status: SharedStatus,
    volume: watch::Sender<f32>,
    notices: mpsc::UnboundedSender<EngineNotice>,
}

impl TurnController {
    /// `events` is the engine's own queue: timer firings, playback
    /// completions and microphone frames are posted back into it.
    pub fn new(
        config: &AppConfig,
        microphone: Box<dyn Microphone>,
        player: Box<dyn AudioPlayer>,
        transport: Box<dyn Transport>,
        events: mpsc::UnboundedSender<EngineEvent>,
        outputs: Outputs,
    ) -> Self {
        let Outputs {
            status,
            volume,
            notices,
        } = outputs;

        let timer_tx = events.clone();
        let on_timer: TimerCallback = Arc::new(move |id| {
            let _ = timer_tx.send(EngineEvent::SilenceElapsed(id));
        });

        let playback_tx = events.clone();
        let on_playback: PlaybackCallback = Arc::new(move |id, outcome| {
            let _ = playback_tx.send(EngineEvent::PlaybackFinished(id, outcome));
        });

        let mut monitor = PlaybackMonitor::new(player, on_playback);
        monitor.set_enabled(config.playback.enabled);

        let controller = Self {
            turn: TurnState::WaitingForUser,
            listening: false,
            acquiring: false,
            analyzer: EnergyAnalyzer::new(),
            segmenter: SpeechSegmenter::new(config.vad.clone(), on_timer),
            session: CaptureSession::new(microphone, &config.audio),
            monitor,
            transport,
            context: SessionContext::from(&config.interview),
            cursor: ConversationCursor::default(),
            min_segment_bytes: config.audio.min_segment_bytes,
            max_send_failures: config.transport.max_send_failures,
            send_failures: 0,
            last_error: None,
            events,
            status,
            volume,
            notices,
        };
        controller.publish();
        controller
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    pub fn far_end_active(&self) -> bool {
        self.monitor.far_end_active()
    }

    pub fn cursor(&self) -> &ConversationCursor {
        &self.cursor
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Apply one event, then publish the resulting status.
    pub fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Frame(frame) => self.on_frame(frame),
            EngineEvent::MicrophoneReady(outcome) => self.on_microphone_ready(outcome),
            EngineEvent::SilenceElapsed(id) => self.on_silence_elapsed(id),
            EngineEvent::PlaybackFinished(id, outcome) => self.on_playback_finished(id, outcome),
            EngineEvent::Transport(TransportEvent::Reply(reply)) => self.on_reply(reply),
            EngineEvent::Transport(TransportEvent::Failed(err)) => self.on_transport_error(err),
            EngineEvent::Command(command) => self.on_command(command),
        }
        self.publish();
    }

    fn on_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Configure(vad) => self.configure(vad),
            EngineCommand::Start => self.start(),
            EngineCommand::Stop => {
                log::info!("engine: stop requested");
                self.teardown();
            }
        }
    }

    fn configure(&mut self, vad: VadConfig) {
        log::info!(
            "engine: min_volume = {:.3}, silence = {} ms",
            vad.min_volume,
            vad.silence_duration_ms
        );
        self.segmenter.set_config(vad);
    }

    /// Open the microphone on the blocking pool; the outcome comes back as
    /// [`EngineEvent::MicrophoneReady`].
    fn start(&mut self) {
        if self.turn.is_ended() {
            self.report(EngineError::SessionEnded);
            return;
        }
        if self.listening || self.acquiring {
            return;
        }

        let frames_tx = self.events.clone();
        let sink: FrameSink = Arc::new(move |frame| {
            let _ = frames_tx.send(EngineEvent::Frame(frame));
        });

        self.acquiring = true;
        let microphone = self.session.microphone();
        let ready_tx = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = microphone.acquire(sink).map(OpenedMicrophone);
            let _ = ready_tx.send(EngineEvent::MicrophoneReady(outcome));
        });
        log::debug!("engine: opening microphone");
    }

    fn on_microphone_ready(&mut self, outcome: Result<OpenedMicrophone, CaptureError>) {
        self.acquiring = false;
        match outcome {
            Ok(OpenedMicrophone(handle)) if self.turn.is_ended() => {
                log::debug!("engine: microphone opened after session end; releasing");
                handle.release();
            }
            Ok(OpenedMicrophone(handle)) => {
                self.session.attach(handle);
                self.listening = true;
                self.last_error = None;
                log::info!("engine: listening");
            }
            Err(_) if self.turn.is_ended() => {}
            // Turn state is left alone; the caller may retry.
            Err(e) => self.report(EngineError::from(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Near end
    // -----------------------------------------------------------------------

    fn on_frame(&mut self, frame: AudioFrame) {
        if !self.listening {
            return;
        }

        let volume = self.analyzer.analyze(&frame.samples);
        lock_status(&self.status).volume = volume;
        self.volume.send_replace(volume);

        if let Some(SegmenterEvent::SpeechStarted) = self.segmenter.on_volume(volume) {
            self.on_speech_started();
        }
        // After the segmenter, so the frame that started speech is captured.
        self.session.push_frame(&frame);
    }

    fn on_silence_elapsed(&mut self, id: TimerId) {
        if let Some(SegmenterEvent::SpeechEnded) = self.segmenter.on_timer(id) {
            self.on_speech_ended();
        }
    }

    fn suppressed(&self) -> bool {
        self.monitor.far_end_active() || self.turn.suppresses_user() || self.cursor.finished
    }

    fn on_speech_started(&mut self) {
        self.notify(EngineNotice::SpeechStarted);
        self.session.open();

        if self.suppressed() {
            log::debug!("engine: speech while {:?}; recording locally only", self.turn);
        } else if self.turn == TurnState::WaitingForUser {
            self.set_turn(TurnState::UserSpeaking);
        }
    }

    fn on_speech_ended(&mut self) {
        self.notify(EngineNotice::SpeechEnded);

        if self.suppressed() {
            self.session.discard();
            log::debug!("engine: dropping segment captured while {:?}", self.turn);
            self.notify(EngineNotice::SegmentDiscarded(DiscardReason::Suppressed));
            return;
        }

        let segment = match self.session.close() {
            Ok(Some(segment)) => segment,
            Ok(None) => {
                self.return_to_user();
                return;
            }
            Err(e) => {
                log::warn!("engine: could not encode segment: {e}");
                self.notify(EngineNotice::SegmentDiscarded(DiscardReason::EncodingFailed(
                    e.to_string(),
                )));
                self.return_to_user();
                return;
            }
        };

        if segment.len() < self.min_segment_bytes {
            log::debug!(
                "engine: segment of {} bytes under {} byte minimum; discarded",
                segment.len(),
                self.min_segment_bytes
            );
            self.notify(EngineNotice::SegmentDiscarded(DiscardReason::TooShort {
                bytes: segment.len(),
                min: self.min_segment_bytes,
            }));
            self.return_to_user();
            return;
        }

        let bytes = segment.len();
        let step = self.cursor.step;
        let message = OutboundMessage::audio(segment.bytes(), &self.context, step);
        match self.transport.send_segment(message) {
            Ok(()) => {
                log::info!("engine: sent {bytes} byte segment for step {step}");
                self.set_turn(TurnState::AwaitingReply);
                self.notify(EngineNotice::SegmentSent {
                    bytes,
                    interview_step: step,
                });
            }
            Err(e) => {
                self.return_to_user();
                self.on_transport_error(e);
            }
        }
    }

    fn return_to_user(&mut self) {
        if matches!(self.turn, TurnState::WaitingForUser | TurnState::UserSpeaking) {
            self.set_turn(TurnState::WaitingForUser);
        }
    }

    // -----------------------------------------------------------------------
    // Far end
    // -----------------------------------------------------------------------

    fn on_reply(&mut self, reply: Reply) {
        if self.turn.is_ended() {
            log::debug!("engine: reply after session end ignored");
            return;
        }

        self.send_failures = 0;
        self.cursor.apply(&reply);
        self.notify(EngineNotice::Reply {
            text: reply.text.clone(),
            interview_step: reply.interview_step,
            finished: reply.finished,
            feedback: reply.feedback.clone(),
        });

        // A reply that talks over the previous one cuts it short.
        if self.monitor.force_idle() {
            self.notify(EngineNotice::PlaybackFinished);
        }
        match self.monitor.begin(reply.audio) {
            PlaybackStart::Started(_) => {
                self.set_turn(TurnState::AiSpeaking);
                self.notify(EngineNotice::PlaybackStarted);
            }
            PlaybackStart::NoAudio => self.finish_turn(),
            PlaybackStart::Failed(e) => {
                self.report(EngineError::Playback(e));
                self.finish_turn();
            }
        }
    }

    fn on_playback_finished(&mut self, id: PlaybackId, outcome: Result<(), PlaybackError>) {
        if !self.monitor.on_finished(id) {
            return;
        }
        if let Err(e) = outcome {
            self.report(EngineError::Playback(e));
        }
        self.notify(EngineNotice::PlaybackFinished);
        if self.turn == TurnState::AiSpeaking {
            self.finish_turn();
        }
    }

    /// The interviewer is done talking: hand the floor back, or end the
    /// session if that was the last reply.
    fn finish_turn(&mut self) {
        if self.cursor.finished {
            log::info!("engine: interview finished");
            self.teardown();
        } else {
            self.set_turn(TurnState::WaitingForUser);
        }
    }

    fn on_transport_error(&mut self, err: TransportError) {
        if self.turn.is_ended() {
            log::debug!("engine: transport error after session end: {err}");
            return;
        }

        if matches!(err, TransportError::Send(_)) {
            self.send_failures += 1;
        }
        let exhausted = self.max_send_failures > 0 && self.send_failures >= self.max_send_failures;
        let terminal = err.is_terminal() || exhausted;

        self.report(EngineError::Transport(err));

        if terminal {
            if exhausted {
                log::error!("engine: {} consecutive send failures", self.send_failures);
            }
            self.teardown();
        } else if self.turn == TurnState::AwaitingReply {
            self.set_turn(TurnState::WaitingForUser);
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// The single exit path.  Idempotent.
    fn teardown(&mut self) {
        if self.turn.is_ended() {
            return;
        }
        log::info!("engine: ending session");

        self.segmenter.reset();
        self.session.discard();
        self.session.shutdown();
        self.listening = false;
        self.acquiring = false;
        if self.monitor.force_idle() {
            self.notify(EngineNotice::PlaybackFinished);
        }
        self.set_turn(TurnState::SessionEnded);
        self.notify(EngineNotice::SessionEnded {
            feedback: self.cursor.feedback.clone(),
        });
        self.transport.close();
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn set_turn(&mut self, turn: TurnState) {
        if self.turn != turn {
            log::debug!("engine: {:?} → {:?}", self.turn, turn);
            self.turn = turn;
        }
    }

    fn report(&mut self, err: EngineError) {
        match &err {
            EngineError::Transport(e) if e.is_terminal() => log::error!("engine: {err}"),
            _ => log::warn!("engine: {err}"),
        }
        self.last_error = Some(err.to_string());
        self.notify(EngineNotice::Error(err));
    }

    fn notify(&self, notice: EngineNotice) {
        // Nobody listening is fine.
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        let mut st = lock_status(&self.status);
        st.listening = self.listening;
        st.speaking = self.segmenter.is_speaking();
        st.turn = self.turn;
        st.far_end_active = self.monitor.far_end_active();
        if st.cursor != self.cursor {
            st.cursor = self.cursor.clone();
        }
        st.last_error.clone_from(&self.last_error);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
