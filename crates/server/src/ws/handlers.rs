// Per-message handlers behind the board WebSocket.
//
// Handlers share one shape: resolve the board's membership, authorize the
// sender, apply the mutation through the store, then fan the result out to
// the membership as it stands after the mutation. Failures never leave the
// originating connection.

use thiserror::Error;

use corkboard_common::{
    protocol::ws::{ClientMessage, ServerMessage},
    types::{CollaboratorUpdate, Note, UserPublic},
};

use crate::{
    embedding::{EmbeddingError, Embeddings},
    store::{BoardMembers, Store, StoreError},
};

use super::broadcast::BroadcastPlanner;

pub(super) const SEARCH_RESULT_LIMIT: usize = 5;
pub(super) const SEARCH_MIN_SIMILARITY: f32 = 0.5;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Authorization(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Transient(&'static str),
}

impl HandlerError {
    /// The private `error` envelope sent back to the originating connection.
    pub fn envelope(&self) -> ServerMessage {
        ServerMessage::Error { message: self.to_string() }
    }
}

impl From<StoreError> for HandlerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(entity) => Self::NotFound(entity),
            StoreError::Conflict(message) => Self::Validation(message.to_owned()),
            StoreError::Database(error) => {
                tracing::error!(error = %error, "store operation failed");
                Self::Transient("storage is temporarily unavailable")
            }
        }
    }
}

impl From<EmbeddingError> for HandlerError {
    fn from(error: EmbeddingError) -> Self {
        match error {
            EmbeddingError::Unconfigured => {
                Self::Validation("semantic search is not configured".to_owned())
            }
            other => {
                tracing::warn!(error = %other, "embedding request failed");
                Self::Transient("semantic search is temporarily unavailable")
            }
        }
    }
}

pub(super) async fn handle_message(
    store: &Store,
    embeddings: &Embeddings,
    planner: &BroadcastPlanner,
    user: &UserPublic,
    message: ClientMessage,
) -> Result<Option<ServerMessage>, HandlerError> {
    match message {
        ClientMessage::GetAllBoards => {
            let boards = store.boards_for_user(user.id).await?;
            Ok(Some(ServerMessage::ReceiveAllBoards(boards)))
        }
        ClientMessage::GetAllUsers => {
            let users = store.all_users().await?;
            Ok(Some(ServerMessage::GetAllUsers(users)))
        }
        ClientMessage::SemanticSearch { query } => {
            semantic_search(store, embeddings, user, &query).await
        }
        ClientMessage::NewNote { board_id, content } => {
            new_note(store, embeddings, planner, user, board_id, content).await
        }
        ClientMessage::UpdateNote { id, board_id, content, is_done } => {
            update_note(store, embeddings, planner, user, id, board_id, content, is_done).await
        }
        ClientMessage::DeleteNote { id, board_id } => {
            delete_note(store, planner, user, id, board_id).await
        }
        ClientMessage::NewNoteBoard { title } => new_note_board(store, user, title).await,
        ClientMessage::UpdateNoteBoard { id, title } => {
            update_note_board(store, planner, user, id, title).await
        }
        ClientMessage::DeleteNoteBoard { id } => {
            delete_note_board(store, planner, user, id).await
        }
        ClientMessage::AddCollaborator { board_id, user_id } => {
            add_collaborator(store, planner, user, board_id, user_id).await
        }
        ClientMessage::RemoveCollaborator { board_id, user_id } => {
            remove_collaborator(store, planner, user, board_id, user_id).await
        }
        ClientMessage::Ping => Ok(Some(ServerMessage::Pong)),
    }
}

async fn semantic_search(
    store: &Store,
    embeddings: &Embeddings,
    user: &UserPublic,
    query: &str,
) -> Result<Option<ServerMessage>, HandlerError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(HandlerError::Validation("search query must not be empty".to_owned()));
    }

    let vector = embeddings.embed_query(query).await?;
    let notes = store
        .search_notes(user.id, &vector, SEARCH_RESULT_LIMIT, SEARCH_MIN_SIMILARITY)
        .await?;

    Ok(Some(ServerMessage::SemanticSearchResult(notes)))
}

async fn new_note(
    store: &Store,
    embeddings: &Embeddings,
    planner: &BroadcastPlanner,
    user: &UserPublic,
    board_id: i64,
    content: String,
) -> Result<Option<ServerMessage>, HandlerError> {
    let content = non_empty(content, "note content must not be empty")?;
    let members = store.board_members(board_id).await?;
    require_member(&members, user.id)?;

    let note = store.create_note(board_id, &content).await?;
    spawn_note_embedding(store, embeddings, &note);
    broadcast_board(planner, board_id, ServerMessage::NewNote(note)).await;

    Ok(None)
}

#[allow(clippy::too_many_arguments)]
async fn update_note(
    store: &Store,
    embeddings: &Embeddings,
    planner: &BroadcastPlanner,
    user: &UserPublic,
    id: i64,
    board_id: i64,
    content: Option<String>,
    is_done: Option<bool>,
) -> Result<Option<ServerMessage>, HandlerError> {
    let members = store.board_members(board_id).await?;
    require_member(&members, user.id)?;

    let note = match (content, is_done) {
        (Some(content), _) => {
            let content = non_empty(content, "note content must not be empty")?;
            let note = store.update_note_content(id, board_id, &content).await?;
            spawn_note_embedding(store, embeddings, &note);
            note
        }
        (None, Some(is_done)) => store.set_note_done(id, board_id, is_done).await?,
        (None, None) => {
            return Err(HandlerError::Validation(
                "update_note requires content or isDone".to_owned(),
            ));
        }
    };

    broadcast_board(planner, board_id, ServerMessage::UpdatedNote(note)).await;

    Ok(None)
}

async fn delete_note(
    store: &Store,
    planner: &BroadcastPlanner,
    user: &UserPublic,
    id: i64,
    board_id: i64,
) -> Result<Option<ServerMessage>, HandlerError> {
    let members = store.board_members(board_id).await?;
    require_member(&members, user.id)?;

    let note = store.delete_note(id, board_id).await?;
    broadcast_board(planner, board_id, ServerMessage::DeleteNote(note)).await;

    Ok(None)
}

async fn new_note_board(
    store: &Store,
    user: &UserPublic,
    title: String,
) -> Result<Option<ServerMessage>, HandlerError> {
    let title = non_empty(title, "board title must not be empty")?;
    let view = store.create_board(user.id, &title).await?;

    // The creator is the only member so far; nobody else to notify.
    Ok(Some(ServerMessage::NewNoteBoard(view)))
}

async fn update_note_board(
    store: &Store,
    planner: &BroadcastPlanner,
    user: &UserPublic,
    id: i64,
    title: String,
) -> Result<Option<ServerMessage>, HandlerError> {
    let title = non_empty(title, "board title must not be empty")?;
    let members = store.board_members(id).await?;
    require_owner(&members, user.id)?;

    let view = store.rename_board(id, &title).await?;
    broadcast_board(planner, id, ServerMessage::UpdatedNoteBoard(view)).await;

    Ok(None)
}

async fn delete_note_board(
    store: &Store,
    planner: &BroadcastPlanner,
    user: &UserPublic,
    id: i64,
) -> Result<Option<ServerMessage>, HandlerError> {
    let members = store.board_members(id).await?;
    require_owner(&members, user.id)?;

    // Capture the recipient set before the membership rows disappear.
    let recipients = members.user_ids();
    let board = store.delete_board(id).await?;
    planner.broadcast_to_users(&recipients, &ServerMessage::DeleteNoteBoard(board)).await;

    Ok(None)
}

async fn add_collaborator(
    store: &Store,
    planner: &BroadcastPlanner,
    user: &UserPublic,
    board_id: i64,
    user_id: i64,
) -> Result<Option<ServerMessage>, HandlerError> {
    let members = store.board_members(board_id).await?;
    require_owner(&members, user.id)?;

    let collaborators = store.add_collaborator(board_id, user_id).await?;
    let recipients: Vec<i64> = collaborators.iter().map(|member| member.id).collect();
    let update = ServerMessage::UpdatedCollaborator(CollaboratorUpdate { board_id, collaborators });
    planner.broadcast_to_users(&recipients, &update).await;

    Ok(None)
}

async fn remove_collaborator(
    store: &Store,
    planner: &BroadcastPlanner,
    user: &UserPublic,
    board_id: i64,
    user_id: i64,
) -> Result<Option<ServerMessage>, HandlerError> {
    let members = store.board_members(board_id).await?;
    require_owner(&members, user.id)?;

    let collaborators = store.remove_collaborator(board_id, user_id).await?;

    // The removed user hears about the removal too.
    let mut recipients: Vec<i64> = collaborators.iter().map(|member| member.id).collect();
    if !recipients.contains(&user_id) {
        recipients.push(user_id);
    }

    let update = ServerMessage::UpdatedCollaborator(CollaboratorUpdate { board_id, collaborators });
    planner.broadcast_to_users(&recipients, &update).await;

    Ok(None)
}

/// Embedding happens off the hot path: the note is broadcast immediately and
/// becomes searchable once the vector lands. A failure only means search will
/// not find this note until its next edit.
fn spawn_note_embedding(store: &Store, embeddings: &Embeddings, note: &Note) {
    if !embeddings.is_enabled() {
        return;
    }

    let store = store.clone();
    let embeddings = embeddings.clone();
    let note_id = note.id;
    let content = note.content.clone();
    tokio::spawn(async move {
        match embeddings.embed_document(&content).await {
            Ok(vector) => {
                if let Err(error) = store.set_note_embedding(note_id, &vector).await {
                    tracing::warn!(error = %error, note_id, "failed to store note embedding");
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, note_id, "failed to embed note content");
            }
        }
    });
}

/// Membership can vanish between the mutation and this lookup; the mutation
/// stands, the fan-out is skipped.
async fn broadcast_board(planner: &BroadcastPlanner, board_id: i64, message: ServerMessage) {
    if let Err(error) = planner.broadcast_to_board(board_id, &message).await {
        tracing::warn!(error = %error, board_id, "membership lookup failed, skipping broadcast");
    }
}

fn require_member(members: &BoardMembers, user_id: i64) -> Result<(), HandlerError> {
    if members.contains(user_id) {
        return Ok(());
    }

    Err(HandlerError::Authorization("you do not have access to this board"))
}

fn require_owner(members: &BoardMembers, user_id: i64) -> Result<(), HandlerError> {
    if members.owner_id == user_id {
        return Ok(());
    }

    Err(HandlerError::Authorization("only the board owner can do that"))
}

fn non_empty(value: String, message: &str) -> Result<String, HandlerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HandlerError::Validation(message.to_owned()));
    }

    Ok(trimmed.to_owned())
}
