//! Integration tests for protocol message serialization.
//!
//! Tests all client and server message types for correct JSON serialization.

use runbox_core::{OutputEvent, PackageRef, SourceFile};
use runbox_server::protocol::*;

#[test]
fn test_all_client_messages_serialize() {
    let messages = vec![
        ClientMessage::Run {
            program: ProgramPayload {
                files: vec![SourceFile::new("main.rs", "fn main() {}").entry()],
                packages: vec![PackageRef::new("rand", "0.8")],
                language_version: Some("2021".to_string()),
                project_type: "console".to_string(),
            },
            session_id: Some("s1".to_string()),
        },
        ClientMessage::Input {
            session_id: "s1".to_string(),
            text: "hello".to_string(),
        },
        ClientMessage::Stop {
            session_id: "s1".to_string(),
        },
    ];

    for msg in messages {
        let json = serde_json::to_string(&msg).expect("Failed to serialize");
        let parsed: ClientMessage = serde_json::from_str(&json).expect("Failed to deserialize");

        let msg_type = match &msg {
            ClientMessage::Run { .. } => "run",
            ClientMessage::Input { .. } => "input",
            ClientMessage::Stop { .. } => "stop",
        };

        assert!(
            json.contains(&format!("\"type\":\"{}\"", msg_type)),
            "Message type '{}' not found in JSON: {}",
            msg_type,
            json
        );
        assert_eq!(
            std::mem::discriminant(&msg),
            std::mem::discriminant(&parsed),
            "Message variant mismatch for {}",
            msg_type
        );
    }
}

#[test]
fn test_all_server_messages_serialize() {
    let messages = vec![
        ServerMessage::Started {
            session_id: "s1".to_string(),
        },
        ServerMessage::Output {
            session_id: "s1".to_string(),
            content: "hi\n".to_string(),
        },
        ServerMessage::Error {
            session_id: "s1".to_string(),
            content: "main.rs:1: oops\n".to_string(),
        },
        ServerMessage::Completed {
            session_id: "s1".to_string(),
            content: "Execution completed".to_string(),
        },
        ServerMessage::InputResult {
            session_id: "s1".to_string(),
            accepted: true,
        },
        ServerMessage::StopResult {
            session_id: "s1".to_string(),
            stopped: false,
        },
        ServerMessage::ProtocolError {
            message: "Invalid message format".to_string(),
        },
    ];

    for msg in messages {
        let json = serde_json::to_string(&msg).expect("Failed to serialize");
        let parsed: ServerMessage = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(msg, parsed, "Roundtrip mismatch for {}", json);
    }
}

#[test]
fn test_minimal_run_message() {
    let msg: ClientMessage = serde_json::from_str(r#"{"type":"run"}"#).unwrap();
    match msg {
        ClientMessage::Run { program, session_id } => {
            assert!(program.files.is_empty());
            assert!(program.packages.is_empty());
            assert!(program.language_version.is_none());
            assert!(session_id.is_none());
        }
        other => panic!("Expected run, got {:?}", other),
    }
}

#[test]
fn test_run_message_with_entry_flag() {
    let json = r#"{
        "type": "run",
        "session_id": "abc",
        "files": [
            {"name": "main.rs", "content": "mod util; fn main() { util::go(); }", "is_entry": true},
            {"name": "util.rs", "content": "pub fn go() {}"}
        ],
        "packages": [{"id": "serde", "version": "1.0"}],
        "project_type": "web"
    }"#;
    let msg: ClientMessage = serde_json::from_str(json).unwrap();
    let ClientMessage::Run { program, session_id } = msg else {
        panic!("Expected run");
    };
    assert_eq!(session_id.as_deref(), Some("abc"));
    assert!(program.files[0].is_entry);
    assert!(!program.files[1].is_entry);
    assert_eq!(program.packages[0].id, "serde");

    let request = program.into_execution_request("abc".to_string());
    assert_eq!(request.session_id.as_deref(), Some("abc"));
    assert_eq!(request.project_type, "web");
    assert!(!request.abort.is_aborted());
}

#[test]
fn test_stream_events_carry_session_id() {
    for event in [
        OutputEvent::output("a"),
        OutputEvent::error("b"),
        OutputEvent::completed("c"),
    ] {
        let mut expected = serde_json::to_value(&event).unwrap();
        expected["session_id"] = "run-7".into();
        let wrapped = serde_json::to_value(ServerMessage::event("run-7", event)).unwrap();
        assert_eq!(expected, wrapped);
    }
}

#[test]
fn test_invalid_message_rejected() {
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"launch_missiles"}"#).is_err());
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"input","session_id":"x"}"#).is_err());
}

#[test]
fn test_http_bodies() {
    let stop = StopResponse::from_stopped(true);
    assert!(stop.success);
    assert_eq!(stop.message, "Stopped");

    let request: PublishApiRequest = serde_json::from_str(
        r#"{"files":[],"project_type":"gui","output_name":"tool","target":"x86_64-pc-windows-msvc"}"#,
    )
    .unwrap();
    let publish = request.into_publish_request();
    assert_eq!(publish.output_name, "tool");
    assert_eq!(publish.project_type, "gui");
    assert_eq!(publish.target.as_deref(), Some("x86_64-pc-windows-msvc"));

    let input: InputRequest = serde_json::from_str(r#"{"session_id":"s","text":"42"}"#).unwrap();
    assert_eq!(input.text, "42");
}
