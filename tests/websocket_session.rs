//! A whole session against a local WebSocket server speaking the
//! interview protocol.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message;

use interview_voice::engine::{EngineError, EngineNotice, VoiceEngine};
use interview_voice::transport::{TransportError, WsTransport};

use common::{expect_notice, wait_listening, ScriptedMic, TimedPlayer};

#[tokio::test]
async fn answer_goes_out_as_wav_and_feedback_comes_back() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let request: serde_json::Value = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("client went away: {other:?}"),
            }
        };
        let reply = serde_json::json!({
            "type": "audio",
            "text": "That concludes our interview.",
            "interview_step": 1,
            "is_finished": true,
            "feedback": "Good use of examples.",
            "audio": null,
        });
        ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        // Hold the socket until the client closes it.
        while let Some(Ok(_)) = ws.next().await {}
        request
    });

    let mut config = common::config();
    config.vad.silence_duration_ms = 100;
    config.audio.encodings = vec!["webm".into(), "wav".into()];
    config.transport.url = format!("ws://{addr}/ws/chat");

    let mic = ScriptedMic::default();
    let (engine, mut notices) = VoiceEngine::new(
        config.clone(),
        Box::new(mic.clone()),
        Box::new(TimedPlayer::new(Duration::from_millis(10))),
    );
    let transport = WsTransport::connect(
        &config.transport.url,
        Duration::from_secs(5),
        engine.transport_callback(),
    )
    .await
    .unwrap();

    let handle = engine.handle();
    let task = tokio::spawn(engine.run(Box::new(transport)));
    handle.start().unwrap();
    wait_listening(&handle).await;

    mic.speak(&[0.3, 0.3, 0.3, 0.0]);

    let reply = expect_notice(&mut notices, |n| matches!(n, EngineNotice::Reply { .. })).await;
    assert_eq!(
        reply,
        EngineNotice::Reply {
            text: "That concludes our interview.".into(),
            interview_step: 1,
            finished: true,
            feedback: Some("Good use of examples.".into()),
        }
    );
    let ended = expect_notice(&mut notices, |n| matches!(n, EngineNotice::SessionEnded { .. })).await;
    assert_eq!(
        ended,
        EngineNotice::SessionEnded {
            feedback: Some("Good use of examples.".into())
        }
    );
    task.await.unwrap();
    assert_eq!(mic.released.load(Ordering::SeqCst), 1);

    let request = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server finished")
        .unwrap();
    assert_eq!(request["type"], "audio");
    assert_eq!(request["interview_step"], 0);
    assert_eq!(request["job_role"], "Site Reliability Engineer");
    let payload = STANDARD
        .decode(request["payload"].as_str().unwrap())
        .unwrap();
    assert_eq!(&payload[..4], b"RIFF");
    assert_eq!(payload.len(), 44 + 4 * 480 * 2);
}

#[tokio::test]
async fn server_hangup_ends_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = ws.close(None).await;
    });

    let mic = ScriptedMic::default();
    let (engine, mut notices) = VoiceEngine::new(
        common::config(),
        Box::new(mic.clone()),
        Box::new(TimedPlayer::new(Duration::from_millis(10))),
    );
    let transport = WsTransport::connect(
        &format!("ws://{addr}/ws/chat"),
        Duration::from_secs(5),
        engine.transport_callback(),
    )
    .await
    .unwrap();

    let handle = engine.handle();
    let task = tokio::spawn(engine.run(Box::new(transport)));
    handle.start().unwrap();

    let err = expect_notice(&mut notices, |n| {
        matches!(n, EngineNotice::Error(EngineError::Transport(_)))
    })
    .await;
    assert!(matches!(
        err,
        EngineNotice::Error(EngineError::Transport(TransportError::Closed(_)))
    ));
    expect_notice(&mut notices, |n| matches!(n, EngineNotice::SessionEnded { .. })).await;
    task.await.unwrap();
}
