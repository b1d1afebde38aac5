//! Network gate integration tests

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use somnus_cloud::transport::{ScriptedResponse, ScriptedTransport};
use somnus_cloud::{CloudClient, CollectSink, Error, NetworkGate, StreamStatus, TextToSpeech};

mod common;

fn slow_speech() -> ScriptedResponse {
    ScriptedResponse::ok(common::tts_body(&[7u8; 600]))
        .chunked(64)
        .delay(Duration::from_millis(2))
}

#[tokio::test]
async fn test_concurrent_requests_never_overlap() {
    let transport = ScriptedTransport::new((0..4).map(|_| slow_speech()));
    let client = common::test_client(&transport, common::test_config());

    let runs = (0..4).map(|i| {
        let tts = TextToSpeech::new(client.clone());
        async move {
            let mut sink = CollectSink::new();
            let outcome = tts.synthesize_streaming(&format!("line {i}"), &mut sink).await;
            (outcome, sink.into_bytes())
        }
    });

    for (outcome, bytes) in join_all(runs).await {
        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, StreamStatus::Completed);
        assert_eq!(bytes, vec![7u8; 600]);
    }

    assert_eq!(transport.peak_concurrency(), 1);
    assert_eq!(transport.requests().len(), 4);
    assert_eq!(client.gate().acquisitions(), 4);
    assert_eq!(client.gate().releases(), 4);
    assert!(!client.gate().is_held());
}

#[tokio::test]
async fn test_busy_gate_times_out_without_connecting() {
    let transport = ScriptedTransport::new([slow_speech()]);
    let gate = NetworkGate::new();

    let mut config = common::test_config();
    config.gate.acquire_timeout = Duration::from_millis(20);
    let client = CloudClient::with_transport(config, Arc::new(transport.clone()), gate.clone());

    let held = gate.try_acquire().unwrap();

    let mut sink = CollectSink::new();
    let err = TextToSpeech::new(client.clone())
        .synthesize_streaming("hello", &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GateTimeout(t) if t == Duration::from_millis(20)));
    assert!(err.is_retryable());
    assert!(transport.requests().is_empty());
    assert_eq!(sink.deliveries(), 0);

    drop(held);
    let outcome = TextToSpeech::new(client)
        .synthesize_streaming("hello", &mut sink)
        .await
        .unwrap();
    assert_eq!(outcome.bytes_delivered, 600);
}

#[tokio::test]
async fn test_clients_sharing_a_gate_are_serialized() {
    let transport = ScriptedTransport::new([slow_speech(), slow_speech()]);
    let gate = NetworkGate::new();

    let client = |gate: &NetworkGate| {
        CloudClient::with_transport(
            common::test_config(),
            Arc::new(transport.clone()),
            gate.clone(),
        )
    };
    let tts_a = TextToSpeech::new(client(&gate));
    let tts_b = TextToSpeech::new(client(&gate));

    let mut sink_a = CollectSink::new();
    let mut sink_b = CollectSink::new();
    let (a, b) = tokio::join!(
        tts_a.synthesize_streaming("one", &mut sink_a),
        tts_b.synthesize_streaming("two", &mut sink_b),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(transport.peak_concurrency(), 1);
    assert_eq!(gate.acquisitions(), 2);
    assert_eq!(gate.releases(), 2);
    assert_eq!(sink_a.bytes().len(), 600);
    assert_eq!(sink_b.bytes().len(), 600);
}

#[tokio::test]
async fn test_gate_released_after_failures() {
    let transport = ScriptedTransport::new([
        ScriptedResponse::with_status(500, "boom"),
        ScriptedResponse::ok(r#"{"audioContent":"%%%%"}"#),
        ScriptedResponse::ok(r#"{"nothing":"here"}"#),
        slow_speech().fail_after(2),
        slow_speech(),
    ]);
    let client = common::test_client(&transport, common::test_config());
    let tts = TextToSpeech::new(client.clone());

    for _ in 0..4 {
        let mut sink = CollectSink::new();
        assert!(tts.synthesize_streaming("x", &mut sink).await.is_err());
        assert!(!client.gate().is_held());
    }

    let mut sink = CollectSink::new();
    let outcome = tts.synthesize_streaming("x", &mut sink).await.unwrap();
    assert_eq!(outcome.status, StreamStatus::Completed);
    assert_eq!(client.gate().acquisitions(), 5);
    assert_eq!(client.gate().releases(), 5);
}
