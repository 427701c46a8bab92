// Core domain types shared across all Corkboard crates.
//
// Field names serialize in camelCase because the WebSocket and HTTP wire
// formats predate this implementation; see protocol::ws for the envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user as visible to other users. Credential material never leaves the
/// server crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: i64,
    pub display_name: String,
}

/// A single note on a board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i64,
    pub board_id: i64,
    pub content: String,
    pub is_done: bool,
    pub created_at: DateTime<Utc>,
}

/// A note board: one owner, zero or more collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NoteBoard {
    pub id: i64,
    pub title: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A board enriched with its notes and collaborator list, as delivered to
/// clients in `receive_all_boards` and board-mutation broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    #[serde(flatten)]
    pub board: NoteBoard,
    pub notes: Vec<Note>,
    pub collaborators: Vec<UserPublic>,
}

/// Payload of an `updated_collaborator` broadcast: the full post-change
/// collaborator list for one board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorUpdate {
    pub board_id: i64,
    pub collaborators: Vec<UserPublic>,
}
