//! End-to-end turn taking through `VoiceEngine::run` with scripted devices.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use interview_voice::config::ConfigError;
use interview_voice::engine::{DiscardReason, EngineError, EngineNotice, TurnState, VoiceEngine};
use interview_voice::transport::TransportEvent;

use common::{
    config, expect_notice, reply, wait_listening, CapturingTransport, ScriptedMic, TimedPlayer,
};

#[tokio::test(start_paused = true)]
async fn full_interview_round_trip() {
    let mic = ScriptedMic::default();
    let player = TimedPlayer::new(Duration::from_secs(2));
    let transport = CapturingTransport::default();

    let (engine, mut notices) =
        VoiceEngine::new(config(), Box::new(mic.clone()), Box::new(player.clone()));
    let handle = engine.handle();
    let deliver = engine.transport_callback();
    let task = tokio::spawn(engine.run(Box::new(transport.clone())));

    handle.start().unwrap();
    wait_listening(&handle).await;

    // First answer.
    mic.speak(&[0.3, 0.3, 0.0]);
    let sent = expect_notice(&mut notices, |n| matches!(n, EngineNotice::SegmentSent { .. })).await;
    assert_eq!(
        sent,
        EngineNotice::SegmentSent {
            bytes: 3 * 960,
            interview_step: 0
        }
    );
    assert_eq!(handle.status().turn, TurnState::AwaitingReply);
    {
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].job_role, "Site Reliability Engineer");
    }

    // Spoken question comes back.
    deliver(TransportEvent::Reply(reply(
        "Describe an outage you handled.",
        1,
        false,
        Some(vec![0xFF; 64]),
    )));
    expect_notice(&mut notices, |n| *n == EngineNotice::PlaybackStarted).await;
    assert!(handle.status().far_end_active);
    assert_eq!(handle.status().turn, TurnState::AiSpeaking);

    expect_notice(&mut notices, |n| *n == EngineNotice::PlaybackFinished).await;
    let status = handle.status();
    assert!(!status.far_end_active);
    assert_eq!(status.cursor.step, 1);

    // Second answer carries the new step.
    mic.speak(&[0.4, 0.4, 0.4, 0.0]);
    let sent = expect_notice(&mut notices, |n| matches!(n, EngineNotice::SegmentSent { .. })).await;
    assert_eq!(
        sent,
        EngineNotice::SegmentSent {
            bytes: 4 * 960,
            interview_step: 1
        }
    );

    // Closing reply without audio ends the interview.
    deliver(TransportEvent::Reply(reply("Thanks, that's all.", 2, true, None)));
    let ended = expect_notice(&mut notices, |n| matches!(n, EngineNotice::SessionEnded { .. })).await;
    assert_eq!(
        ended,
        EngineNotice::SessionEnded {
            feedback: Some("Clear answers; quantify impact more.".into())
        }
    );

    task.await.unwrap();
    assert_eq!(player.played.load(Ordering::SeqCst), 1);
    assert_eq!(transport.sent.lock().unwrap().len(), 2);
    assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    assert_eq!(mic.released.load(Ordering::SeqCst), 1);

    let status = handle.status();
    assert_eq!(status.turn, TurnState::SessionEnded);
    assert!(!status.listening);
    assert_eq!(
        status.cursor.feedback.as_deref(),
        Some("Clear answers; quantify impact more.")
    );

    // Engine is gone; commands are refused.
    assert_eq!(handle.start(), Err(EngineError::Stopped));
}

#[tokio::test(start_paused = true)]
async fn talking_over_the_interviewer_is_not_sent() {
    let mic = ScriptedMic::default();
    let transport = CapturingTransport::default();
    let (engine, mut notices) = VoiceEngine::new(
        config(),
        Box::new(mic.clone()),
        Box::new(TimedPlayer::new(Duration::from_secs(10))),
    );
    let handle = engine.handle();
    let deliver = engine.transport_callback();
    let task = tokio::spawn(engine.run(Box::new(transport.clone())));

    handle.start().unwrap();
    wait_listening(&handle).await;

    deliver(TransportEvent::Reply(reply("Welcome.", 0, false, Some(vec![1; 32]))));
    expect_notice(&mut notices, |n| *n == EngineNotice::PlaybackStarted).await;

    mic.speak(&[0.5, 0.5, 0.0]);
    let discarded =
        expect_notice(&mut notices, |n| matches!(n, EngineNotice::SegmentDiscarded(_))).await;
    assert_eq!(
        discarded,
        EngineNotice::SegmentDiscarded(DiscardReason::Suppressed)
    );
    assert!(transport.sent.lock().unwrap().is_empty());

    handle.stop().unwrap();
    expect_notice(&mut notices, |n| matches!(n, EngineNotice::SessionEnded { .. })).await;
    task.await.unwrap();
    assert!(!handle.status().far_end_active);
}

#[tokio::test(start_paused = true)]
async fn stop_mid_utterance_sends_nothing() {
    let mic = ScriptedMic::default();
    let transport = CapturingTransport::default();
    let (engine, mut notices) = VoiceEngine::new(
        config(),
        Box::new(mic.clone()),
        Box::new(TimedPlayer::new(Duration::from_secs(1))),
    );
    let handle = engine.handle();
    let task = tokio::spawn(engine.run(Box::new(transport.clone())));

    handle.start().unwrap();
    wait_listening(&handle).await;
    mic.speak(&[0.3, 0.3]);
    expect_notice(&mut notices, |n| *n == EngineNotice::SpeechStarted).await;

    handle.stop().unwrap();
    expect_notice(&mut notices, |n| matches!(n, EngineNotice::SessionEnded { feedback: None })).await;
    task.await.unwrap();

    assert!(transport.sent.lock().unwrap().is_empty());
    assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    assert_eq!(mic.released.load(Ordering::SeqCst), 1);
    assert!(!handle.status().speaking);
}

#[tokio::test]
async fn configure_rejects_out_of_range_values() {
    let (engine, _notices) = VoiceEngine::new(
        config(),
        Box::new(ScriptedMic::default()),
        Box::new(TimedPlayer::new(Duration::from_secs(1))),
    );
    let handle = engine.handle();

    assert_eq!(
        handle.configure(1.5, Duration::from_secs(1)),
        Err(EngineError::Config(ConfigError::MinVolumeOutOfRange(1.5)))
    );
    assert_eq!(
        handle.configure(0.1, Duration::ZERO),
        Err(EngineError::Config(ConfigError::ZeroSilenceDuration))
    );
    assert!(handle.configure(0.2, Duration::from_millis(800)).is_ok());
}
