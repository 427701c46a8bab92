// Persistence for users, note boards, notes, and collaborator rosters.
//
// `Store` dispatches between a PostgreSQL backend (pgvector embeddings
// for semantic search) and an in-memory backend used for tests and
// database-less development.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use corkboard_common::types::{BoardView, Note, NoteBoard, UserPublic};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;

mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Authentication-side view of a user row (includes the password hash).
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub display_name: String,
    pub password_hash: String,
}

impl UserRecord {
    pub fn public(&self) -> UserPublic {
        UserPublic { id: self.id, display_name: self.display_name.clone() }
    }
}

/// Owner and collaborator ids for one board, used for authorization
/// checks and broadcast fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardMembers {
    pub owner_id: i64,
    pub collaborator_ids: Vec<i64>,
}

impl BoardMembers {
    pub fn contains(&self, user_id: i64) -> bool {
        self.owner_id == user_id || self.collaborator_ids.contains(&user_id)
    }

    pub fn user_ids(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.collaborator_ids.len() + 1);
        ids.push(self.owner_id);
        ids.extend_from_slice(&self.collaborator_ids);
        ids
    }
}

#[derive(Clone)]
pub enum Store {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryStore>>),
}

impl Store {
    pub fn postgres(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryStore::default())))
    }

    pub async fn create_user(
        &self,
        display_name: &str,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError> {
        match self {
            Self::Postgres(pool) => create_user_pg(pool, display_name, password_hash).await,
            Self::Memory(store) => memory::create_user(store, display_name, password_hash).await,
        }
    }

    pub async fn user_auth_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        match self {
            Self::Postgres(pool) => user_auth_by_display_name_pg(pool, display_name).await,
            Self::Memory(store) => memory::user_auth_by_display_name(store, display_name).await,
        }
    }

    pub async fn user_public_by_id(&self, user_id: i64) -> Result<Option<UserPublic>, StoreError> {
        match self {
            Self::Postgres(pool) => user_public_by_id_pg(pool, user_id).await,
            Self::Memory(store) => memory::user_public_by_id(store, user_id).await,
        }
    }

    pub async fn all_users(&self) -> Result<Vec<UserPublic>, StoreError> {
        match self {
            Self::Postgres(pool) => all_users_pg(pool).await,
            Self::Memory(store) => memory::all_users(store).await,
        }
    }

    pub async fn create_board(&self, owner_id: i64, title: &str) -> Result<BoardView, StoreError> {
        match self {
            Self::Postgres(pool) => create_board_pg(pool, owner_id, title).await,
            Self::Memory(store) => memory::create_board(store, owner_id, title).await,
        }
    }

    pub async fn board_view(&self, board_id: i64) -> Result<BoardView, StoreError> {
        match self {
            Self::Postgres(pool) => board_view_pg(pool, board_id).await,
            Self::Memory(store) => memory::board_view(store, board_id).await,
        }
    }

    pub async fn boards_for_user(&self, user_id: i64) -> Result<Vec<BoardView>, StoreError> {
        match self {
            Self::Postgres(pool) => boards_for_user_pg(pool, user_id).await,
            Self::Memory(store) => memory::boards_for_user(store, user_id).await,
        }
    }

    pub async fn rename_board(&self, board_id: i64, title: &str) -> Result<BoardView, StoreError> {
        match self {
            Self::Postgres(pool) => rename_board_pg(pool, board_id, title).await,
            Self::Memory(store) => memory::rename_board(store, board_id, title).await,
        }
    }

    pub async fn delete_board(&self, board_id: i64) -> Result<NoteBoard, StoreError> {
        match self {
            Self::Postgres(pool) => delete_board_pg(pool, board_id).await,
            Self::Memory(store) => memory::delete_board(store, board_id).await,
        }
    }

    pub async fn board_members(&self, board_id: i64) -> Result<BoardMembers, StoreError> {
        match self {
            Self::Postgres(pool) => board_members_pg(pool, board_id).await,
            Self::Memory(store) => memory::board_members(store, board_id).await,
        }
    }

    /// Adds `user_id` as a collaborator and returns the updated roster
    /// (owner first). Adding the owner or an existing collaborator is a
    /// no-op.
    pub async fn add_collaborator(
        &self,
        board_id: i64,
        user_id: i64,
    ) -> Result<Vec<UserPublic>, StoreError> {
        match self {
            Self::Postgres(pool) => add_collaborator_pg(pool, board_id, user_id).await,
            Self::Memory(store) => memory::add_collaborator(store, board_id, user_id).await,
        }
    }

    pub async fn remove_collaborator(
        &self,
        board_id: i64,
        user_id: i64,
    ) -> Result<Vec<UserPublic>, StoreError> {
        match self {
            Self::Postgres(pool) => remove_collaborator_pg(pool, board_id, user_id).await,
            Self::Memory(store) => memory::remove_collaborator(store, board_id, user_id).await,
        }
    }

    pub async fn create_note(&self, board_id: i64, content: &str) -> Result<Note, StoreError> {
        match self {
            Self::Postgres(pool) => create_note_pg(pool, board_id, content).await,
            Self::Memory(store) => memory::create_note(store, board_id, content).await,
        }
    }

    pub async fn update_note_content(
        &self,
        note_id: i64,
        board_id: i64,
        content: &str,
    ) -> Result<Note, StoreError> {
        match self {
            Self::Postgres(pool) => update_note_content_pg(pool, note_id, board_id, content).await,
            Self::Memory(store) => {
                memory::update_note_content(store, note_id, board_id, content).await
            }
        }
    }

    pub async fn set_note_done(
        &self,
        note_id: i64,
        board_id: i64,
        is_done: bool,
    ) -> Result<Note, StoreError> {
        match self {
            Self::Postgres(pool) => set_note_done_pg(pool, note_id, board_id, is_done).await,
            Self::Memory(store) => memory::set_note_done(store, note_id, board_id, is_done).await,
        }
    }

    pub async fn delete_note(&self, note_id: i64, board_id: i64) -> Result<Note, StoreError> {
        match self {
            Self::Postgres(pool) => delete_note_pg(pool, note_id, board_id).await,
            Self::Memory(store) => memory::delete_note(store, note_id, board_id).await,
        }
    }

    pub async fn set_note_embedding(
        &self,
        note_id: i64,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => set_note_embedding_pg(pool, note_id, embedding).await,
            Self::Memory(store) => memory::set_note_embedding(store, note_id, embedding).await,
        }
    }

    /// Ranks embedded notes on the requester's boards by cosine
    /// similarity to the query embedding.
    pub async fn search_notes(
        &self,
        user_id: i64,
        query_embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<Note>, StoreError> {
        match self {
            Self::Postgres(pool) => {
                search_notes_pg(pool, user_id, query_embedding, limit, min_similarity).await
            }
            Self::Memory(store) => {
                memory::search_notes(store, user_id, query_embedding, limit, min_similarity).await
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserAuthRow {
    id: i64,
    display_name: String,
    password_hash: String,
}

impl From<UserAuthRow> for UserRecord {
    fn from(value: UserAuthRow) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            password_hash: value.password_hash,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    display_name: String,
}

impl From<UserRow> for UserPublic {
    fn from(value: UserRow) -> Self {
        Self { id: value.id, display_name: value.display_name }
    }
}

#[derive(sqlx::FromRow)]
struct BoardRow {
    id: i64,
    title: String,
    owner_id: i64,
    created_at: DateTime<Utc>,
}

impl From<BoardRow> for NoteBoard {
    fn from(value: BoardRow) -> Self {
        Self {
            id: value.id,
            title: value.title,
            owner_id: value.owner_id,
            created_at: value.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: i64,
    board_id: i64,
    content: String,
    is_done: bool,
    created_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(value: NoteRow) -> Self {
        Self {
            id: value.id,
            board_id: value.board_id,
            content: value.content,
            is_done: value.is_done,
            created_at: value.created_at,
        }
    }
}

async fn create_user_pg(
    pool: &PgPool,
    display_name: &str,
    password_hash: &str,
) -> Result<UserRecord, StoreError> {
    let row = sqlx::query_as::<_, UserAuthRow>(
        r#"
        INSERT INTO users (display_name, password_hash)
        VALUES ($1, $2)
        RETURNING id, display_name, password_hash
        "#,
    )
    .bind(display_name)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(row.into())
}

async fn user_auth_by_display_name_pg(
    pool: &PgPool,
    display_name: &str,
) -> Result<Option<UserRecord>, StoreError> {
    let row = sqlx::query_as::<_, UserAuthRow>(
        r#"
        SELECT id, display_name, password_hash
        FROM users
        WHERE display_name = $1
        "#,
    )
    .bind(display_name)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(row.map(UserRecord::from))
}

async fn user_public_by_id_pg(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<UserPublic>, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, display_name
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(row.map(UserPublic::from))
}

async fn all_users_pg(pool: &PgPool) -> Result<Vec<UserPublic>, StoreError> {
    let rows = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, display_name
        FROM users
        ORDER BY display_name ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(rows.into_iter().map(UserPublic::from).collect())
}

async fn create_board_pg(
    pool: &PgPool,
    owner_id: i64,
    title: &str,
) -> Result<BoardView, StoreError> {
    let row = sqlx::query_as::<_, BoardRow>(
        r#"
        INSERT INTO note_boards (title, owner_id)
        VALUES ($1, $2)
        RETURNING id, title, owner_id, created_at
        "#,
    )
    .bind(title)
    .bind(owner_id)
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    view_for_board_pg(pool, row.into()).await
}

async fn board_view_pg(pool: &PgPool, board_id: i64) -> Result<BoardView, StoreError> {
    let row = board_row_pg(pool, board_id).await?.ok_or(StoreError::NotFound("board"))?;
    view_for_board_pg(pool, row.into()).await
}

async fn boards_for_user_pg(pool: &PgPool, user_id: i64) -> Result<Vec<BoardView>, StoreError> {
    let rows = sqlx::query_as::<_, BoardRow>(
        r#"
        SELECT b.id, b.title, b.owner_id, b.created_at
        FROM note_boards AS b
        LEFT JOIN board_collaborators AS bc
            ON bc.board_id = b.id AND bc.user_id = $1
        WHERE b.owner_id = $1
           OR bc.user_id IS NOT NULL
        ORDER BY b.created_at ASC, b.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        views.push(view_for_board_pg(pool, row.into()).await?);
    }
    Ok(views)
}

async fn rename_board_pg(
    pool: &PgPool,
    board_id: i64,
    title: &str,
) -> Result<BoardView, StoreError> {
    let row = sqlx::query_as::<_, BoardRow>(
        r#"
        UPDATE note_boards
        SET title = $2
        WHERE id = $1
        RETURNING id, title, owner_id, created_at
        "#,
    )
    .bind(board_id)
    .bind(title)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound("board"))?;

    view_for_board_pg(pool, row.into()).await
}

async fn delete_board_pg(pool: &PgPool, board_id: i64) -> Result<NoteBoard, StoreError> {
    let row = sqlx::query_as::<_, BoardRow>(
        r#"
        DELETE FROM note_boards
        WHERE id = $1
        RETURNING id, title, owner_id, created_at
        "#,
    )
    .bind(board_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound("board"))?;

    Ok(row.into())
}

async fn board_members_pg(pool: &PgPool, board_id: i64) -> Result<BoardMembers, StoreError> {
    let owner_id = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT owner_id
        FROM note_boards
        WHERE id = $1
        "#,
    )
    .bind(board_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound("board"))?;

    let collaborator_ids = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT user_id
        FROM board_collaborators
        WHERE board_id = $1
        ORDER BY added_at ASC, user_id ASC
        "#,
    )
    .bind(board_id)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(BoardMembers { owner_id, collaborator_ids })
}

async fn add_collaborator_pg(
    pool: &PgPool,
    board_id: i64,
    user_id: i64,
) -> Result<Vec<UserPublic>, StoreError> {
    let owner_id = board_owner_pg(pool, board_id).await?;
    if user_public_by_id_pg(pool, user_id).await?.is_none() {
        return Err(StoreError::NotFound("user"));
    }

    if user_id != owner_id {
        sqlx::query(
            r#"
            INSERT INTO board_collaborators (board_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (board_id, user_id) DO NOTHING
            "#,
        )
        .bind(board_id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    }

    roster_pg(pool, board_id, owner_id).await
}

async fn remove_collaborator_pg(
    pool: &PgPool,
    board_id: i64,
    user_id: i64,
) -> Result<Vec<UserPublic>, StoreError> {
    let owner_id = board_owner_pg(pool, board_id).await?;

    sqlx::query(
        r#"
        DELETE FROM board_collaborators
        WHERE board_id = $1
          AND user_id = $2
        "#,
    )
    .bind(board_id)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;

    roster_pg(pool, board_id, owner_id).await
}

async fn create_note_pg(pool: &PgPool, board_id: i64, content: &str) -> Result<Note, StoreError> {
    let row = sqlx::query_as::<_, NoteRow>(
        r#"
        INSERT INTO notes (board_id, content)
        VALUES ($1, $2)
        RETURNING id, board_id, content, is_done, created_at
        "#,
    )
    .bind(board_id)
    .bind(content)
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(row.into())
}

async fn update_note_content_pg(
    pool: &PgPool,
    note_id: i64,
    board_id: i64,
    content: &str,
) -> Result<Note, StoreError> {
    let row = sqlx::query_as::<_, NoteRow>(
        r#"
        UPDATE notes
        SET content = $3, embedding = NULL
        WHERE id = $1
          AND board_id = $2
        RETURNING id, board_id, content, is_done, created_at
        "#,
    )
    .bind(note_id)
    .bind(board_id)
    .bind(content)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound("note"))?;

    Ok(row.into())
}

async fn set_note_done_pg(
    pool: &PgPool,
    note_id: i64,
    board_id: i64,
    is_done: bool,
) -> Result<Note, StoreError> {
    let row = sqlx::query_as::<_, NoteRow>(
        r#"
        UPDATE notes
        SET is_done = $3
        WHERE id = $1
          AND board_id = $2
        RETURNING id, board_id, content, is_done, created_at
        "#,
    )
    .bind(note_id)
    .bind(board_id)
    .bind(is_done)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound("note"))?;

    Ok(row.into())
}

async fn delete_note_pg(pool: &PgPool, note_id: i64, board_id: i64) -> Result<Note, StoreError> {
    let row = sqlx::query_as::<_, NoteRow>(
        r#"
        DELETE FROM notes
        WHERE id = $1
          AND board_id = $2
        RETURNING id, board_id, content, is_done, created_at
        "#,
    )
    .bind(note_id)
    .bind(board_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound("note"))?;

    Ok(row.into())
}

async fn set_note_embedding_pg(
    pool: &PgPool,
    note_id: i64,
    embedding: &[f32],
) -> Result<(), StoreError> {
    // A note deleted while its embedding was in flight is not an error.
    sqlx::query(
        r#"
        UPDATE notes
        SET embedding = $2::vector
        WHERE id = $1
        "#,
    )
    .bind(note_id)
    .bind(vector_literal(embedding))
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

async fn search_notes_pg(
    pool: &PgPool,
    user_id: i64,
    query_embedding: &[f32],
    limit: usize,
    min_similarity: f32,
) -> Result<Vec<Note>, StoreError> {
    let rows = sqlx::query_as::<_, NoteRow>(
        r#"
        SELECT n.id, n.board_id, n.content, n.is_done, n.created_at
        FROM notes AS n
        INNER JOIN note_boards AS b
            ON b.id = n.board_id
        LEFT JOIN board_collaborators AS bc
            ON bc.board_id = b.id AND bc.user_id = $1
        WHERE (b.owner_id = $1 OR bc.user_id IS NOT NULL)
          AND n.embedding IS NOT NULL
          AND 1 - (n.embedding <=> $2::vector) >= $3
        ORDER BY n.embedding <=> $2::vector ASC
        LIMIT $4
        "#,
    )
    .bind(user_id)
    .bind(vector_literal(query_embedding))
    .bind(f64::from(min_similarity))
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(rows.into_iter().map(Note::from).collect())
}

async fn board_row_pg(pool: &PgPool, board_id: i64) -> Result<Option<BoardRow>, StoreError> {
    sqlx::query_as::<_, BoardRow>(
        r#"
        SELECT id, title, owner_id, created_at
        FROM note_boards
        WHERE id = $1
        "#,
    )
    .bind(board_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)
}

async fn board_owner_pg(pool: &PgPool, board_id: i64) -> Result<i64, StoreError> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT owner_id
        FROM note_boards
        WHERE id = $1
        "#,
    )
    .bind(board_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound("board"))
}

async fn view_for_board_pg(pool: &PgPool, board: NoteBoard) -> Result<BoardView, StoreError> {
    let notes = sqlx::query_as::<_, NoteRow>(
        r#"
        SELECT id, board_id, content, is_done, created_at
        FROM notes
        WHERE board_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(board.id)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;

    let collaborators = roster_pg(pool, board.id, board.owner_id).await?;

    Ok(BoardView {
        board,
        notes: notes.into_iter().map(Note::from).collect(),
        collaborators,
    })
}

/// Owner first, then collaborators in the order they were added.
async fn roster_pg(
    pool: &PgPool,
    board_id: i64,
    owner_id: i64,
) -> Result<Vec<UserPublic>, StoreError> {
    let mut roster = Vec::new();
    if let Some(owner) = user_public_by_id_pg(pool, owner_id).await? {
        roster.push(owner);
    }

    let collaborators = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT u.id, u.display_name
        FROM board_collaborators AS bc
        INNER JOIN users AS u
            ON u.id = bc.user_id
        WHERE bc.board_id = $1
        ORDER BY bc.added_at ASC, u.id ASC
        "#,
    )
    .bind(board_id)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;

    roster.extend(collaborators.into_iter().map(UserPublic::from));
    Ok(roster)
}

/// pgvector input literal, e.g. `[0.1,0.2,0.3]`.
fn vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|value| value.to_string()).collect();
    format!("[{}]", values.join(","))
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(database_error) = &error {
        match database_error.code().as_deref() {
            Some("23505") => return StoreError::Conflict("display name already taken"),
            Some("23503") => return StoreError::NotFound("referenced row"),
            _ => {}
        }
    }

    StoreError::Database(error)
}
