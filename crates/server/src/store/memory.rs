// In-memory store backend.
//
// Used when no database URL is configured, and by the test suites so
// they can run without PostgreSQL. Semantics mirror the Postgres
// backend, including cosine ranking for semantic search.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use corkboard_common::types::{BoardView, Note, NoteBoard, UserPublic};
use tokio::sync::RwLock;

use super::{BoardMembers, StoreError, UserRecord};

#[derive(Default)]
pub struct MemoryStore {
    users: BTreeMap<i64, MemoryUser>,
    boards: BTreeMap<i64, MemoryBoard>,
    notes: BTreeMap<i64, MemoryNote>,
    next_user_id: i64,
    next_board_id: i64,
    next_note_id: i64,
}

#[derive(Clone)]
struct MemoryUser {
    display_name: String,
    password_hash: String,
}

#[derive(Clone)]
struct MemoryBoard {
    title: String,
    owner_id: i64,
    collaborator_ids: Vec<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
struct MemoryNote {
    board_id: i64,
    content: String,
    is_done: bool,
    embedding: Option<Vec<f32>>,
    created_at: DateTime<Utc>,
}

impl MemoryStore {
    fn user_public(&self, user_id: i64) -> Option<UserPublic> {
        self.users
            .get(&user_id)
            .map(|user| UserPublic { id: user_id, display_name: user.display_name.clone() })
    }

    fn board(&self, board_id: i64) -> Result<&MemoryBoard, StoreError> {
        self.boards.get(&board_id).ok_or(StoreError::NotFound("board"))
    }

    fn board_record(&self, board_id: i64, board: &MemoryBoard) -> NoteBoard {
        NoteBoard {
            id: board_id,
            title: board.title.clone(),
            owner_id: board.owner_id,
            created_at: board.created_at,
        }
    }

    /// Owner first, then collaborators in the order they were added.
    fn roster(&self, board: &MemoryBoard) -> Vec<UserPublic> {
        let mut roster = Vec::with_capacity(board.collaborator_ids.len() + 1);
        if let Some(owner) = self.user_public(board.owner_id) {
            roster.push(owner);
        }
        for user_id in &board.collaborator_ids {
            if let Some(user) = self.user_public(*user_id) {
                roster.push(user);
            }
        }
        roster
    }

    fn notes_for_board(&self, board_id: i64) -> Vec<Note> {
        self.notes
            .iter()
            .filter(|(_, note)| note.board_id == board_id)
            .map(|(note_id, note)| note_record(*note_id, note))
            .collect()
    }

    fn view(&self, board_id: i64) -> Result<BoardView, StoreError> {
        let board = self.board(board_id)?;
        Ok(BoardView {
            board: self.board_record(board_id, board),
            notes: self.notes_for_board(board_id),
            collaborators: self.roster(board),
        })
    }
}

fn note_record(note_id: i64, note: &MemoryNote) -> Note {
    Note {
        id: note_id,
        board_id: note.board_id,
        content: note.content.clone(),
        is_done: note.is_done,
        created_at: note.created_at,
    }
}

pub(super) async fn create_user(
    store: &Arc<RwLock<MemoryStore>>,
    display_name: &str,
    password_hash: &str,
) -> Result<UserRecord, StoreError> {
    let mut state = store.write().await;
    if state.users.values().any(|user| user.display_name == display_name) {
        return Err(StoreError::Conflict("display name already taken"));
    }

    state.next_user_id += 1;
    let user_id = state.next_user_id;
    state.users.insert(
        user_id,
        MemoryUser {
            display_name: display_name.to_owned(),
            password_hash: password_hash.to_owned(),
        },
    );

    Ok(UserRecord {
        id: user_id,
        display_name: display_name.to_owned(),
        password_hash: password_hash.to_owned(),
    })
}

pub(super) async fn user_auth_by_display_name(
    store: &Arc<RwLock<MemoryStore>>,
    display_name: &str,
) -> Result<Option<UserRecord>, StoreError> {
    let state = store.read().await;
    Ok(state.users.iter().find(|(_, user)| user.display_name == display_name).map(
        |(user_id, user)| UserRecord {
            id: *user_id,
            display_name: user.display_name.clone(),
            password_hash: user.password_hash.clone(),
        },
    ))
}

pub(super) async fn user_public_by_id(
    store: &Arc<RwLock<MemoryStore>>,
    user_id: i64,
) -> Result<Option<UserPublic>, StoreError> {
    let state = store.read().await;
    Ok(state.user_public(user_id))
}

pub(super) async fn all_users(
    store: &Arc<RwLock<MemoryStore>>,
) -> Result<Vec<UserPublic>, StoreError> {
    let state = store.read().await;
    let mut users: Vec<UserPublic> = state
        .users
        .iter()
        .map(|(user_id, user)| UserPublic { id: *user_id, display_name: user.display_name.clone() })
        .collect();
    users.sort_by(|left, right| left.display_name.cmp(&right.display_name));
    Ok(users)
}

pub(super) async fn create_board(
    store: &Arc<RwLock<MemoryStore>>,
    owner_id: i64,
    title: &str,
) -> Result<BoardView, StoreError> {
    let mut state = store.write().await;
    if !state.users.contains_key(&owner_id) {
        return Err(StoreError::NotFound("user"));
    }

    state.next_board_id += 1;
    let board_id = state.next_board_id;
    state.boards.insert(
        board_id,
        MemoryBoard {
            title: title.to_owned(),
            owner_id,
            collaborator_ids: Vec::new(),
            created_at: Utc::now(),
        },
    );

    state.view(board_id)
}

pub(super) async fn board_view(
    store: &Arc<RwLock<MemoryStore>>,
    board_id: i64,
) -> Result<BoardView, StoreError> {
    let state = store.read().await;
    state.view(board_id)
}

pub(super) async fn boards_for_user(
    store: &Arc<RwLock<MemoryStore>>,
    user_id: i64,
) -> Result<Vec<BoardView>, StoreError> {
    let state = store.read().await;
    let mut views = Vec::new();
    for (board_id, board) in &state.boards {
        if board.owner_id == user_id || board.collaborator_ids.contains(&user_id) {
            views.push(state.view(*board_id)?);
        }
    }
    Ok(views)
}

pub(super) async fn rename_board(
    store: &Arc<RwLock<MemoryStore>>,
    board_id: i64,
    title: &str,
) -> Result<BoardView, StoreError> {
    let mut state = store.write().await;
    let board = state.boards.get_mut(&board_id).ok_or(StoreError::NotFound("board"))?;
    board.title = title.to_owned();
    state.view(board_id)
}

pub(super) async fn delete_board(
    store: &Arc<RwLock<MemoryStore>>,
    board_id: i64,
) -> Result<NoteBoard, StoreError> {
    let mut state = store.write().await;
    let board = state.boards.remove(&board_id).ok_or(StoreError::NotFound("board"))?;
    state.notes.retain(|_, note| note.board_id != board_id);
    Ok(NoteBoard {
        id: board_id,
        title: board.title,
        owner_id: board.owner_id,
        created_at: board.created_at,
    })
}

pub(super) async fn board_members(
    store: &Arc<RwLock<MemoryStore>>,
    board_id: i64,
) -> Result<BoardMembers, StoreError> {
    let state = store.read().await;
    let board = state.board(board_id)?;
    Ok(BoardMembers {
        owner_id: board.owner_id,
        collaborator_ids: board.collaborator_ids.clone(),
    })
}

pub(super) async fn add_collaborator(
    store: &Arc<RwLock<MemoryStore>>,
    board_id: i64,
    user_id: i64,
) -> Result<Vec<UserPublic>, StoreError> {
    let mut state = store.write().await;
    if !state.users.contains_key(&user_id) {
        return Err(StoreError::NotFound("user"));
    }
    let board = state.boards.get_mut(&board_id).ok_or(StoreError::NotFound("board"))?;
    if board.owner_id != user_id && !board.collaborator_ids.contains(&user_id) {
        board.collaborator_ids.push(user_id);
    }

    let board = state.board(board_id)?;
    Ok(state.roster(board))
}

pub(super) async fn remove_collaborator(
    store: &Arc<RwLock<MemoryStore>>,
    board_id: i64,
    user_id: i64,
) -> Result<Vec<UserPublic>, StoreError> {
    let mut state = store.write().await;
    let board = state.boards.get_mut(&board_id).ok_or(StoreError::NotFound("board"))?;
    board.collaborator_ids.retain(|collaborator| *collaborator != user_id);

    let board = state.board(board_id)?;
    Ok(state.roster(board))
}

pub(super) async fn create_note(
    store: &Arc<RwLock<MemoryStore>>,
    board_id: i64,
    content: &str,
) -> Result<Note, StoreError> {
    let mut state = store.write().await;
    if !state.boards.contains_key(&board_id) {
        return Err(StoreError::NotFound("board"));
    }

    state.next_note_id += 1;
    let note_id = state.next_note_id;
    let note = MemoryNote {
        board_id,
        content: content.to_owned(),
        is_done: false,
        embedding: None,
        created_at: Utc::now(),
    };
    let record = note_record(note_id, &note);
    state.notes.insert(note_id, note);
    Ok(record)
}

pub(super) async fn update_note_content(
    store: &Arc<RwLock<MemoryStore>>,
    note_id: i64,
    board_id: i64,
    content: &str,
) -> Result<Note, StoreError> {
    let mut state = store.write().await;
    let note = state
        .notes
        .get_mut(&note_id)
        .filter(|note| note.board_id == board_id)
        .ok_or(StoreError::NotFound("note"))?;
    note.content = content.to_owned();
    // Stale embeddings must not match the new text; re-embedding happens async.
    note.embedding = None;
    Ok(note_record(note_id, note))
}

pub(super) async fn set_note_done(
    store: &Arc<RwLock<MemoryStore>>,
    note_id: i64,
    board_id: i64,
    is_done: bool,
) -> Result<Note, StoreError> {
    let mut state = store.write().await;
    let note = state
        .notes
        .get_mut(&note_id)
        .filter(|note| note.board_id == board_id)
        .ok_or(StoreError::NotFound("note"))?;
    note.is_done = is_done;
    Ok(note_record(note_id, note))
}

pub(super) async fn delete_note(
    store: &Arc<RwLock<MemoryStore>>,
    note_id: i64,
    board_id: i64,
) -> Result<Note, StoreError> {
    let mut state = store.write().await;
    match state.notes.get(&note_id) {
        Some(note) if note.board_id == board_id => {}
        _ => return Err(StoreError::NotFound("note")),
    }
    let note = state.notes.remove(&note_id).ok_or(StoreError::NotFound("note"))?;
    Ok(note_record(note_id, &note))
}

pub(super) async fn set_note_embedding(
    store: &Arc<RwLock<MemoryStore>>,
    note_id: i64,
    embedding: &[f32],
) -> Result<(), StoreError> {
    let mut state = store.write().await;
    // A note deleted while its embedding was in flight is not an error.
    if let Some(note) = state.notes.get_mut(&note_id) {
        note.embedding = Some(embedding.to_vec());
    }
    Ok(())
}

pub(super) async fn search_notes(
    store: &Arc<RwLock<MemoryStore>>,
    user_id: i64,
    query_embedding: &[f32],
    limit: usize,
    min_similarity: f32,
) -> Result<Vec<Note>, StoreError> {
    let state = store.read().await;
    let accessible: Vec<i64> = state
        .boards
        .iter()
        .filter(|(_, board)| {
            board.owner_id == user_id || board.collaborator_ids.contains(&user_id)
        })
        .map(|(board_id, _)| *board_id)
        .collect();

    let mut matches: Vec<(f32, Note)> = state
        .notes
        .iter()
        .filter(|(_, note)| accessible.contains(&note.board_id))
        .filter_map(|(note_id, note)| {
            let embedding = note.embedding.as_ref()?;
            let similarity = cosine_similarity(embedding, query_embedding);
            (similarity >= min_similarity).then(|| (similarity, note_record(*note_id, note)))
        })
        .collect();

    matches.sort_by(|left, right| {
        right.0.partial_cmp(&left.0).unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit);

    Ok(matches.into_iter().map(|(_, note)| note).collect())
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_left = 0.0f32;
    let mut norm_right = 0.0f32;
    for (l, r) in left.iter().zip(right) {
        dot += l * r;
        norm_left += l * l;
        norm_right += r * r;
    }

    if norm_left == 0.0 || norm_right == 0.0 {
        return 0.0;
    }
    dot / (norm_left.sqrt() * norm_right.sqrt())
}

#[cfg(test)]
mod tests {
    use super::cosine_similarity;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.5, -0.25, 0.75];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_mismatched_or_zero_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
