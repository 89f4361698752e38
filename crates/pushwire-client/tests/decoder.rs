#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};

use pushwire_client::StreamDecoder;
use pushwire_core::{EventType, PushwireError};

fn chunks(parts: &[&str]) -> impl futures_util::Stream<Item = io::Result<Bytes>> + Unpin {
    let owned: Vec<io::Result<Bytes>> = parts
        .iter()
        .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
        .collect();
    stream::iter(owned)
}

#[tokio::test]
async fn yields_envelopes_in_order_across_chunk_splits() {
    let mut d = StreamDecoder::new(chunks(&[
        "data: {\"type\":\"server.connected\",\"properties\":{}}\n\ndata: {\"ty",
        "pe\":\"session.idle\",\"properties\":{\"sessionID\":\"s1\"}}\n",
        "\n",
    ]));
    assert!(d.current().is_none());

    assert!(d.advance().await.unwrap());
    assert_eq!(d.current().unwrap().event_type, EventType::ServerConnected);

    assert!(d.advance().await.unwrap());
    let env = d.current().unwrap();
    assert_eq!(env.event_type, EventType::SessionIdle);
    assert_eq!(env.properties["sessionID"], "s1");

    assert!(!d.advance().await.unwrap());
    assert!(d.current().is_none());
    assert!(d.is_done());
}

#[tokio::test]
async fn unknown_type_is_passed_through() {
    let mut d = StreamDecoder::new(chunks(&[
        "data: {\"type\":\"future.thing\",\"properties\":{\"x\":1}}\n\n",
    ]));
    assert!(d.advance().await.unwrap());
    let env = d.take_current().unwrap();
    assert_eq!(env.event_type, EventType::Unknown("future.thing".into()));
    assert!(!env.event_type.is_known());
}

#[tokio::test]
async fn truncated_stream_is_malformed_then_spent() {
    let mut d = StreamDecoder::new(chunks(&[
        "data: {\"type\":\"session.idle\",\"properties\":{}}\n\n",
        "data: {\"type\":\"session.idle\",\"prop",
    ]));
    assert!(d.advance().await.unwrap());

    let err = d.advance().await.unwrap_err();
    assert!(matches!(err, PushwireError::MalformedFrame(_)));
    assert!(d.current().is_none());

    // safe to keep polling; nothing more comes out
    assert!(!d.advance().await.unwrap());
}

#[tokio::test]
async fn bad_json_is_malformed() {
    let mut d = StreamDecoder::new(chunks(&["data: {not json}\n\n"]));
    let err = d.advance().await.unwrap_err();
    assert_eq!(err.client_code().as_str(), "MALFORMED_FRAME");
}

#[tokio::test]
async fn transport_error_surfaces_as_transport() {
    let items: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(
            b"data: {\"type\":\"session.idle\",\"properties\":{}}\n\n",
        )),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
    ];
    let mut d = StreamDecoder::new(stream::iter(items));

    assert!(d.advance().await.unwrap());
    let err = d.advance().await.unwrap_err();
    assert!(matches!(err, PushwireError::Transport(ref m) if m.contains("peer reset")));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn forty_megabyte_frame_decodes_whole() {
    let text = "x".repeat(40 * 1024 * 1024);
    let wire = format!(
        "data: {{\"type\":\"message.part.updated\",\"properties\":{{\"text\":\"{text}\"}}}}\n\n"
    );
    let wire = Bytes::from(wire);
    let items: Vec<io::Result<Bytes>> = wire
        .chunks(1024 * 1024)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();

    let mut d = StreamDecoder::new(stream::iter(items));
    assert!(d.advance().await.unwrap());
    let env = d.take_current().unwrap();
    assert_eq!(env.event_type, EventType::MessagePartUpdated);
    assert_eq!(env.properties["text"].as_str().unwrap().len(), text.len());
    assert!(!d.advance().await.unwrap());
}

#[tokio::test]
async fn idle_timeout_counts_silence_not_frame_duration() {
    let wire = b"data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"s1\"}}\n\n";
    // the frame trickles in over ~400ms, 50ms per chunk, then the line goes quiet
    let items: Vec<io::Result<Bytes>> = wire
        .chunks(8)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    let body = stream::iter(items)
        .then(|item| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            item
        })
        .chain(stream::pending());

    let mut d = StreamDecoder::new(Box::pin(body)).with_idle_timeout(Duration::from_millis(200));
    assert!(d.advance().await.unwrap());
    assert_eq!(d.current().unwrap().properties["sessionID"], "s1");

    let err = d.advance().await.unwrap_err();
    assert!(matches!(err, PushwireError::Timeout));
    assert!(err.is_retryable());
    assert!(d.is_done());
}
