//! Envelope, encoder, and control wire shape tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde_json::json;

use pushwire_core::control::{Command, CommandResult, CommandStatus};
use pushwire_core::frame::{encode_frame, FrameParser};
use pushwire_core::{Envelope, EventType};

#[test]
fn known_tags_resolve_to_themselves() {
    for t in EventType::KNOWN {
        assert!(t.is_known());
        assert_eq!(EventType::parse(t.as_str()), t);
    }
    assert_eq!(EventType::parse("session.idle"), EventType::SessionIdle);
}

#[test]
fn unknown_tag_is_carried_verbatim() {
    let env: Envelope =
        serde_json::from_str(r#"{"type":"brand.new","properties":{"a":[1,2]}}"#).unwrap();
    assert_eq!(env.event_type, EventType::Unknown("brand.new".into()));
    assert!(!env.event_type.is_known());
    assert_eq!(
        serde_json::to_value(&env).unwrap(),
        json!({"type": "brand.new", "properties": {"a": [1, 2]}})
    );
}

#[test]
fn connected_frame_bytes() {
    let frame = encode_frame(&Envelope::connected()).unwrap();
    assert_eq!(
        &frame[..],
        b"data: {\"type\":\"server.connected\",\"properties\":{}}\n\n"
    );
}

#[test]
fn encoded_frame_with_newlines_in_payload_stays_one_frame() {
    let env = Envelope::new(
        EventType::MessagePartUpdated,
        json!({"part": {"id": "p1", "messageID": "m1", "text": "line one\n\nline two"}}),
    );
    let frame = encode_frame(&env).unwrap();

    let mut parser = FrameParser::new();
    parser.push(&frame);
    assert_eq!(parser.next_frame().unwrap(), Some(env));
    assert_eq!(parser.next_frame().unwrap(), None);
    assert_eq!(parser.buffered(), 0);
    parser.finish().unwrap();
}

#[test]
fn comment_only_block_is_skipped() {
    let mut parser = FrameParser::new();
    parser.push(b": ping\n\n");
    assert_eq!(parser.next_frame().unwrap(), None);
    parser.finish().unwrap();
}

#[test]
fn command_wire_shape() {
    let cmd: Command =
        serde_json::from_str(r#"{"id":"c1","command":"focus","target":"editor"}"#).unwrap();
    assert_eq!(cmd.name, "focus");
    assert_eq!(cmd.arg("target"), Some(&json!("editor")));

    let back = serde_json::to_value(&cmd).unwrap();
    assert_eq!(back, json!({"id": "c1", "command": "focus", "target": "editor"}));
}

#[test]
fn command_result_wire_shape() {
    let ok = CommandResult::ok("c1", json!("ok"));
    assert_eq!(
        serde_json::to_value(&ok).unwrap(),
        json!({"commandId": "c1", "status": "ok", "result": "ok"})
    );

    // status defaults to ok when a peer omits it
    let parsed: CommandResult =
        serde_json::from_str(r#"{"commandId":"c2","result":"ok"}"#).unwrap();
    assert_eq!(parsed.status, CommandStatus::Ok);

    let failed = CommandResult::failed("c3", "no editor");
    assert!(!failed.is_ok());
    assert_eq!(failed.result, json!({"error": "no editor"}));
}
