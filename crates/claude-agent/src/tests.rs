/// Deserialization of representative stream-json lines.
#[cfg(test)]
mod unit {
    use crate::types::{ContentBlock, Message, ResultMessage, SystemPayload};

    fn parse(json: &str) -> Message {
        serde_json::from_str(json).expect("failed to parse message")
    }

    #[test]
    fn parse_system_init() {
        let json = r#"{
            "type": "system",
            "subtype": "init",
            "session_id": "abc-123",
            "model": "claude-sonnet-4-6",
            "tools": ["Read", "Glob", "Grep"],
            "permissionMode": "acceptEdits",
            "cwd": "/tmp"
        }"#;
        let Message::System(sys) = parse(json) else {
            panic!("expected System")
        };
        assert_eq!(sys.session_id, "abc-123");
        let SystemPayload::Init(init) = sys.payload else {
            panic!("expected Init")
        };
        assert_eq!(init.tools.len(), 3);
        assert_eq!(init.permission_mode.as_deref(), Some("acceptEdits"));
    }

    #[test]
    fn parse_system_unknown_subtype() {
        let json = r#"{"type": "system", "subtype": "compact_boundary", "session_id": "abc"}"#;
        let Message::System(sys) = parse(json) else {
            panic!("expected System")
        };
        assert!(matches!(sys.payload, SystemPayload::Unknown));
    }

    #[test]
    fn parse_assistant_text_and_tool_use() {
        let json = r#"{
            "type": "assistant",
            "session_id": "abc-123",
            "parent_tool_use_id": null,
            "message": {
                "id": "msg_abc",
                "role": "assistant",
                "model": "claude-sonnet-4-6",
                "content": [
                    {"type": "text", "text": "Reading the story."},
                    {"type": "tool_use", "id": "tu_1", "name": "Read", "input": {"file_path": "/tmp/story.yaml"}},
                    {"type": "text", "text": "risk_score: 3"}
                ]
            }
        }"#;
        let msg = parse(json);
        assert_eq!(
            msg.assistant_text().as_deref(),
            Some("Reading the story.\nrisk_score: 3")
        );
        let Message::Assistant(asst) = msg else {
            panic!("expected Assistant")
        };
        assert!(matches!(asst.message.content[1], ContentBlock::ToolUse { .. }));
    }

    #[test]
    fn parse_user_tool_result() {
        let json = r#"{
            "type": "user",
            "session_id": "abc-123",
            "parent_tool_use_id": null,
            "message": {
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "tu_1", "content": "file body", "is_error": false}]
            }
        }"#;
        let msg = parse(json);
        assert!(msg.assistant_text().is_none());
        let Message::User(user) = msg else {
            panic!("expected User")
        };
        assert!(matches!(
            user.message.content[0],
            ContentBlock::ToolResult { is_error: Some(false), .. }
        ));
    }

    #[test]
    fn parse_result_error_during_execution() {
        let json = r#"{
            "type": "result",
            "subtype": "error_during_execution",
            "session_id": "abc-123",
            "is_error": true,
            "num_turns": 4,
            "total_cost_usd": 0.02,
            "errors": ["tool crashed"]
        }"#;
        let Message::Result(result) = parse(json) else {
            panic!("expected Result")
        };
        assert!(result.is_error());
        assert!(matches!(result, ResultMessage::ErrorDuringExecution(_)));
        assert_eq!(result.result_text(), None);
        assert_eq!(result.error_summary(), "error_during_execution: tool crashed");
    }

    #[test]
    fn parse_tool_progress() {
        let json = r#"{
            "type": "tool_progress",
            "tool_use_id": "tu_1",
            "tool_name": "Grep",
            "elapsed_time_seconds": 2.5,
            "session_id": "abc-123"
        }"#;
        let Message::ToolProgress(tp) = parse(json) else {
            panic!("expected ToolProgress")
        };
        assert_eq!(tp.tool_name, "Grep");
    }
}
