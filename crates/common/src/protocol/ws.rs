// WebSocket envelopes for the Corkboard board protocol.
//
// Every frame is a JSON object `{"type": <tag>, "data": <payload>}`; frames
// without a payload omit `data` entirely. The inbound and outbound catalogs
// are separate enums that deliberately share a few tags (`new_note` etc.):
// a client *requests* `new_note` and the server *announces* `new_note`, with
// different payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{BoardView, CollaboratorUpdate, Note, NoteBoard, UserPublic};

/// Close code sent when a connection fails credential checks. Clients treat
/// it as "refresh your token", unlike ordinary network drops.
pub const CLOSE_CODE_POLICY_VIOLATION: u16 = 1008;

/// Clean shutdown close code; clients do not reconnect after it.
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// Every inbound tag the server dispatches on. Tags outside this list are
/// logged and ignored rather than answered with an error.
pub const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "get_all_boards",
    "get_all_users",
    "semantic_search",
    "new_note",
    "update_note",
    "delete_note",
    "new_note_board",
    "update_note_board",
    "delete_note_board",
    "add_collaborator",
    "remove_collaborator",
    "ping",
];

/// Client -> Server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    GetAllBoards,
    GetAllUsers,
    SemanticSearch {
        query: String,
    },
    #[serde(rename_all = "camelCase")]
    NewNote {
        board_id: i64,
        content: String,
    },
    /// Either a content edit (re-embedded for search) or a done-flag flip;
    /// `content` wins when both are present.
    #[serde(rename_all = "camelCase")]
    UpdateNote {
        id: i64,
        board_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_done: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteNote {
        id: i64,
        board_id: i64,
    },
    NewNoteBoard {
        title: String,
    },
    UpdateNoteBoard {
        id: i64,
        title: String,
    },
    DeleteNoteBoard {
        id: i64,
    },
    #[serde(rename_all = "camelCase")]
    AddCollaborator {
        board_id: i64,
        user_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    RemoveCollaborator {
        board_id: i64,
        user_id: i64,
    },
    Ping,
}

/// Payload of the `connected` acknowledgement that completes a handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub connection_id: Uuid,
    pub user: UserPublic,
}

/// Server -> Client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected(ConnectedPayload),
    ReceiveAllBoards(Vec<BoardView>),
    NewNote(Note),
    UpdatedNote(Note),
    DeleteNote(Note),
    NewNoteBoard(BoardView),
    UpdatedNoteBoard(BoardView),
    DeleteNoteBoard(NoteBoard),
    UpdatedCollaborator(CollaboratorUpdate),
    GetAllUsers(Vec<UserPublic>),
    SemanticSearchResult(Vec<Note>),
    Pong,
    Error { message: String },
}

/// Why an inbound frame could not be turned into a [`ClientMessage`].
///
/// Distinct from the unknown-tag case: decode errors earn the sender a
/// private `error` envelope, unknown tags are dropped silently.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("frame has no `type` tag")]
    MissingType,
    #[error("invalid `{message_type}` payload: {source}")]
    InvalidPayload {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of decoding one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(ClientMessage),
    /// A well-formed envelope whose tag the server does not dispatch on.
    Unknown { message_type: String },
}

/// Decode an inbound frame in two steps: probe the `type` tag first so an
/// unrecognized tag can be told apart from a recognized tag with a bad
/// payload.
pub fn decode_client_message(raw: &str) -> Result<Decoded, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    let Some(message_type) = value.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::MissingType);
    };
    if !CLIENT_MESSAGE_TYPES.contains(&message_type) {
        return Ok(Decoded::Unknown { message_type: message_type.to_owned() });
    }
    let message_type = message_type.to_owned();
    serde_json::from_value::<ClientMessage>(value)
        .map(Decoded::Message)
        .map_err(|source| DecodeError::InvalidPayload { message_type, source })
}

/// Decode a server frame on the client side. Unknown tags come back as
/// [`ServerDecoded::Unknown`] so clients skip them instead of erroring.
pub fn decode_server_message(raw: &str) -> Result<ServerDecoded, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    let Some(message_type) = value.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::MissingType);
    };
    let message_type = message_type.to_owned();
    match serde_json::from_value::<ServerMessage>(value) {
        Ok(message) => Ok(ServerDecoded::Message(message)),
        Err(source) if is_unknown_variant(&source) => {
            Ok(ServerDecoded::Unknown { message_type })
        }
        Err(source) => Err(DecodeError::InvalidPayload { message_type, source }),
    }
}

/// Outcome of decoding one server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerDecoded {
    Message(ServerMessage),
    Unknown { message_type: String },
}

fn is_unknown_variant(error: &serde_json::Error) -> bool {
    error.to_string().starts_with("unknown variant")
}

pub fn encode_client_message(message: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

pub fn encode_server_message(message: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_tags_match_dispatch_table() {
        let samples: Vec<(ClientMessage, &str)> = vec![
            (ClientMessage::GetAllBoards, "get_all_boards"),
            (ClientMessage::GetAllUsers, "get_all_users"),
            (ClientMessage::SemanticSearch { query: "milk".into() }, "semantic_search"),
            (ClientMessage::NewNote { board_id: 7, content: "x".into() }, "new_note"),
            (
                ClientMessage::UpdateNote {
                    id: 3,
                    board_id: 7,
                    content: Some("x".into()),
                    is_done: None,
                },
                "update_note",
            ),
            (ClientMessage::DeleteNote { id: 3, board_id: 7 }, "delete_note"),
            (ClientMessage::NewNoteBoard { title: "plan".into() }, "new_note_board"),
            (ClientMessage::UpdateNoteBoard { id: 7, title: "plan v2".into() }, "update_note_board"),
            (ClientMessage::DeleteNoteBoard { id: 7 }, "delete_note_board"),
            (ClientMessage::AddCollaborator { board_id: 7, user_id: 2 }, "add_collaborator"),
            (ClientMessage::RemoveCollaborator { board_id: 7, user_id: 2 }, "remove_collaborator"),
            (ClientMessage::Ping, "ping"),
        ];

        assert_eq!(samples.len(), CLIENT_MESSAGE_TYPES.len());
        for (message, expected_tag) in samples {
            let value = serde_json::to_value(&message).expect("client message should serialize");
            assert_eq!(value["type"], expected_tag);
            assert!(
                CLIENT_MESSAGE_TYPES.contains(&expected_tag),
                "`{expected_tag}` must be in the dispatch table",
            );
        }
    }

    #[test]
    fn payload_fields_are_camel_case() {
        let value = serde_json::to_value(ClientMessage::UpdateNote {
            id: 3,
            board_id: 7,
            content: Some("x".into()),
            is_done: None,
        })
        .expect("update_note should serialize");

        assert_eq!(value["data"]["boardId"], 7);
        assert!(value["data"].get("board_id").is_none());
        assert!(value["data"].get("isDone").is_none(), "absent options must be omitted");
    }

    #[test]
    fn bare_frames_omit_data() {
        let value = serde_json::to_value(ClientMessage::Ping).expect("ping should serialize");
        assert_eq!(value, serde_json::json!({ "type": "ping" }));

        let value = serde_json::to_value(ServerMessage::Pong).expect("pong should serialize");
        assert_eq!(value, serde_json::json!({ "type": "pong" }));
    }

    #[test]
    fn decode_dispatches_known_tags() {
        let decoded = decode_client_message(
            r#"{"type":"update_note","data":{"id":3,"boardId":7,"content":"x"}}"#,
        )
        .expect("frame should decode");

        assert_eq!(
            decoded,
            Decoded::Message(ClientMessage::UpdateNote {
                id: 3,
                board_id: 7,
                content: Some("x".into()),
                is_done: None,
            })
        );
    }

    #[test]
    fn decode_reports_unknown_tags_without_error() {
        let decoded = decode_client_message(r#"{"type":"jump","data":{"height":3}}"#)
            .expect("unknown tag should not be a decode error");
        assert_eq!(decoded, Decoded::Unknown { message_type: "jump".into() });
    }

    #[test]
    fn decode_rejects_invalid_json() {
        assert!(matches!(decode_client_message("{nope"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_missing_type() {
        assert!(matches!(
            decode_client_message(r#"{"data":{"id":1}}"#),
            Err(DecodeError::MissingType)
        ));
    }

    #[test]
    fn decode_rejects_bad_payload_for_known_tag() {
        let error = decode_client_message(r#"{"type":"new_note","data":{"boardId":"seven"}}"#)
            .expect_err("string boardId should fail payload decode");
        match error {
            DecodeError::InvalidPayload { message_type, .. } => {
                assert_eq!(message_type, "new_note");
            }
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn server_decode_skips_unknown_tags() {
        let decoded = decode_server_message(r#"{"type":"motd","data":"hi"}"#)
            .expect("unknown server tag should not error");
        assert_eq!(decoded, ServerDecoded::Unknown { message_type: "motd".into() });
    }

    #[test]
    fn error_envelope_carries_only_a_message() {
        let value = serde_json::to_value(ServerMessage::Error { message: "Not authorized".into() })
            .expect("error should serialize");
        assert_eq!(value, serde_json::json!({ "type": "error", "data": { "message": "Not authorized" } }));
    }

    #[test]
    fn connected_payload_shape() {
        let connection_id = Uuid::new_v4();
        let value = serde_json::to_value(ServerMessage::Connected(ConnectedPayload {
            connection_id,
            user: UserPublic { id: 1, display_name: "alex".into() },
        }))
        .expect("connected should serialize");

        assert_eq!(value["type"], "connected");
        assert_eq!(value["data"]["connectionId"], connection_id.to_string());
        assert_eq!(value["data"]["user"]["displayName"], "alex");
    }
}
