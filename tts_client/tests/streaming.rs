mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{end, start, MockServer, Reply, Script, Trigger};
use serde_json::json;
use tts_client::config::STREAM_WS_PATH;
use tts_client::{
    ConnectOptions, DuplexSession, LocalTts, SessionConnector, StreamOutcome, StreamState, TtsError, TtsOptions,
    WsConnector,
};
use tts_core::{AudioEvent, ChannelEmitter, PcmBuffer};

#[tokio::test]
async fn test_hello_world_over_websocket() {
    let server = MockServer::start(Script::replies(
        Trigger::Terminal,
        vec![
            start("seg-1"),
            Reply::Binary(vec![1, 0, 2, 0]),
            Reply::Binary(vec![3, 0]),
            Reply::Binary(vec![4, 0]),
            end(),
            Reply::Close,
        ],
    ))
    .await;
    let tts = LocalTts::new(server.options()).unwrap();

    let stream = tts.stream(ConnectOptions::default());
    stream.push_text("Hello world.").unwrap();
    stream.end_input().unwrap();
    assert_eq!(tts.active_streams(), 1);

    let mut audio = PcmBuffer::new();
    stream.run(&mut audio).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0]["voice"], "tara");
    assert_eq!(requests[0]["input"], "Hello world. ");
    assert_eq!(requests[0]["continue"], true);
    assert_eq!(requests[0]["segment_id"].as_str().map(str::len), Some(12));
    assert_eq!(
        requests[1],
        json!({ "voice": "tara", "input": "", "continue": false, "segment_id": "final" })
    );

    let config = audio.config().unwrap();
    assert!(config.streaming);
    assert_eq!(config.sample_rate, 24_000);
    assert_eq!(audio.segments().len(), 1);
    assert_eq!(audio.segments()[0].id, "seg-1");
    assert_eq!(audio.pcm(), vec![1, 0, 2, 0, 3, 0, 4, 0]);
    assert_eq!(audio.flush_count(), 1);

    assert_eq!(tts.active_streams(), 0);
    let snapshot = tts.metrics().snapshot();
    assert_eq!(snapshot.streams_completed, 1);
    assert_eq!(snapshot.requests_sent, 2);
    assert_eq!(snapshot.audio_bytes, 8);
    assert_eq!(snapshot.time_to_first_audio.count, 1);
}

#[tokio::test]
async fn test_incremental_tokens_become_sentences() {
    let server = MockServer::start(Script::default()).await;
    let tts = LocalTts::new(server.options()).unwrap();

    let stream = tts.stream(ConnectOptions::default());
    let writer = stream.writer();
    let feeder = tokio::spawn(async move {
        for token in ["The quick brown", " fox jumps over.", " The lazy dog ", "sleeps all day."] {
            writer.push_text(token).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        writer.end_input().unwrap();
    });

    let mut audio = PcmBuffer::new();
    stream.run(&mut audio).await.unwrap();
    feeder.await.unwrap();

    let inputs: Vec<String> = server
        .requests()
        .iter()
        .map(|r| r["input"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        inputs,
        vec![
            "The quick brown fox jumps over. ".to_string(),
            "The lazy dog sleeps all day. ".to_string(),
            String::new(),
        ]
    );
    // no audio at all: nothing to end, still flushed
    assert!(audio.segments().is_empty());
    assert_eq!(audio.flush_count(), 1);
}

#[tokio::test]
async fn test_voice_update_applies_to_new_streams() {
    let server = MockServer::start(Script::default()).await;
    let tts = LocalTts::new(server.options()).unwrap();
    tts.update_options(tts_client::OptionsUpdate::default().voice("leo"))
        .unwrap();

    let stream = tts.stream(ConnectOptions::default());
    stream.push_text("A sentence for the new voice.").unwrap();
    stream.end_input().unwrap();
    stream.run(&mut PcmBuffer::new()).await.unwrap();

    assert!(server.requests().iter().all(|r| r["voice"] == "leo"));
}

#[tokio::test]
async fn test_connection_drop_fails_stream() {
    let server = MockServer::start(Script::replies(
        Trigger::FirstRequest,
        vec![start("s1"), Reply::Binary(vec![9, 9]), Reply::Drop],
    ))
    .await;
    let tts = LocalTts::new(server.options()).unwrap();

    let stream = tts.stream(ConnectOptions::default());
    let writer = stream.writer();
    writer.push_text("This sentence is long enough to go out. ").unwrap();

    let mut audio = PcmBuffer::new();
    let result = stream.run(&mut audio).await;

    assert!(matches!(result, Err(TtsError::Connection(_))), "got {result:?}");
    assert_eq!(audio.segments().len(), 1);
    assert_eq!(audio.segments()[0].pcm, vec![9, 9]);
    assert_eq!(audio.flush_count(), 0);
    assert_eq!(tts.active_streams(), 0);
    assert_eq!(tts.metrics().streams_failed.load(Ordering::Relaxed), 1);
    assert!(matches!(writer.push_text("more"), Err(TtsError::InputClosed)));
}

#[tokio::test]
async fn test_connect_timeout() {
    let addr = common::silent_listener().await;
    let tts = LocalTts::new(TtsOptions {
        base_url: format!("http://{addr}"),
        ..TtsOptions::default()
    })
    .unwrap();

    let stream = tts.stream(ConnectOptions::with_timeout(Duration::from_millis(100)));
    let mut audio = PcmBuffer::new();
    let result = stream.run(&mut audio).await;

    assert!(matches!(result, Err(TtsError::Timeout)));
    assert!(audio.config().is_none());
    assert_eq!(tts.active_streams(), 0);
}

#[tokio::test]
async fn test_rejected_upgrade_is_connection_error() {
    let server = MockServer::start(Script::default()).await;
    let tts = LocalTts::new(TtsOptions {
        base_url: format!("{}/missing", server.base_url()),
        ..TtsOptions::default()
    })
    .unwrap();

    let result = tts
        .stream(ConnectOptions::default())
        .run(&mut PcmBuffer::new())
        .await;
    match result {
        Err(TtsError::Connection(message)) => assert!(message.contains("404"), "{message}"),
        other => panic!("expected Connection, got {other:?}"),
    }
    assert_eq!(tts.metrics().streams_failed.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_session_close_is_idempotent() {
    let server = MockServer::start(Script::default()).await;
    let connector = WsConnector::new(server.options().ws_url(STREAM_WS_PATH));
    assert!(connector.url().starts_with("ws://127.0.0.1:"));

    let session = connector.connect(Duration::from_secs(5)).await.unwrap();
    assert!(!session.is_closed());

    session.close().await;
    session.close().await;
    assert!(session.is_closed());

    let result = session.send("{}".to_string()).await;
    assert!(matches!(result, Err(TtsError::Connection(_))), "got {result:?}");
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_client_close_aborts_running_stream() {
    let server = MockServer::start(Script::replies(
        Trigger::FirstRequest,
        vec![start("s1"), Reply::Binary(vec![1, 2])],
    ))
    .await;
    let tts = LocalTts::new(server.options()).unwrap();

    let stream = tts.stream(ConnectOptions::default());
    let handle = stream.abort_handle();
    let writer = stream.writer();
    writer.push_text("Keep this stream busy for a while. ").unwrap();

    let (emitter, mut events) = ChannelEmitter::channel();
    let task = tokio::spawn(async move {
        let mut emitter = emitter;
        stream.run(&mut emitter).await
    });

    while let Some(event) = events.recv().await {
        if matches!(event, AudioEvent::Audio(_)) {
            break;
        }
    }
    tts.close().await;

    assert_eq!(handle.state(), StreamState::Closed(StreamOutcome::Aborted));
    assert!(task.await.unwrap().is_ok());
    assert_eq!(tts.active_streams(), 0);

    let rest: Vec<AudioEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(rest, vec![AudioEvent::SegmentEnded]);
    assert_eq!(tts.metrics().streams_aborted.load(Ordering::Relaxed), 1);
}
