// Credential HTTP endpoints: signup, login, refresh, logout.
//
// Access tokens travel in the response body; refresh tokens travel only
// in an HttpOnly cookie so page scripts never see them. Any 401 from
// this router clears that cookie to force a clean re-login.

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};

use corkboard_common::types::UserPublic;

use crate::{
    auth::tokens::{TokenError, TokenPair, TokenService},
    error::{ErrorCode, ServerError},
    store::{Store, StoreError},
};

const REFRESH_COOKIE: &str = "refreshToken";
const CLEAR_REFRESH_COOKIE: &str = "refreshToken=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict";

const MAX_DISPLAY_NAME_LENGTH: usize = 64;
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone)]
struct AuthState {
    store: Store,
    tokens: TokenService,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRequest {
    display_name: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionEnvelope {
    access_token: String,
    user: UserPublic,
}

#[derive(Debug)]
enum AuthError {
    Validation { message: String },
    MissingRefresh,
    InvalidCredentials,
    ExpiredRefresh,
    UserGone,
    DisplayNameTaken,
    Internal(anyhow::Error),
}

impl AuthError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }
}

impl From<StoreError> for AuthError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(_) => Self::DisplayNameTaken,
            StoreError::NotFound(_) => Self::InvalidCredentials,
            StoreError::Database(error) => Self::Internal(error.into()),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::ExpiredCredential => Self::ExpiredRefresh,
            TokenError::UserGone => Self::UserGone,
            TokenError::InvalidCredential | TokenError::WrongCredentialType => {
                Self::InvalidCredentials
            }
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (error, clear_cookie) = match self {
            Self::Validation { message } => {
                (ServerError::new(ErrorCode::ValidationFailed, message), false)
            }
            Self::MissingRefresh => (
                ServerError::new(ErrorCode::AuthInvalidCredential, "missing refresh token"),
                true,
            ),
            Self::InvalidCredentials => {
                (ServerError::from_code(ErrorCode::AuthInvalidCredential), true)
            }
            Self::ExpiredRefresh => {
                (ServerError::from_code(ErrorCode::AuthExpiredCredential), true)
            }
            Self::UserGone => (ServerError::from_code(ErrorCode::AuthUserGone), true),
            Self::DisplayNameTaken => (ServerError::from_code(ErrorCode::DisplayNameTaken), false),
            Self::Internal(error) => (ServerError::internal(error), false),
        };

        let mut response = error.into_response();
        if clear_cookie {
            response
                .headers_mut()
                .insert(header::SET_COOKIE, HeaderValue::from_static(CLEAR_REFRESH_COOKIE));
        }
        response
    }
}

pub fn router(store: Store, tokens: TokenService) -> Router {
    let state = AuthState { store, tokens };

    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .with_state(state)
}

async fn signup(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, AuthError> {
    let display_name = payload.display_name.trim().to_owned();
    validate_display_name(&display_name)?;
    validate_password(&payload.password)?;

    let password_hash = state.tokens.hash_password(&payload.password)?;
    let user = state.store.create_user(&display_name, &password_hash).await?.public();
    let pair = state.tokens.issue(&user)?;

    Ok((StatusCode::CREATED, session_response(&state.tokens, pair, user)).into_response())
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, AuthError> {
    let record = state
        .store
        .user_auth_by_display_name(payload.display_name.trim())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !state.tokens.verify_password(&payload.password, &record.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    let user = record.public();
    let pair = state.tokens.issue(&user)?;

    Ok(session_response(&state.tokens, pair, user))
}

async fn refresh(State(state): State<AuthState>, headers: HeaderMap) -> Result<Response, AuthError> {
    let token = refresh_token_from_headers(&headers).ok_or(AuthError::MissingRefresh)?;
    let (pair, user) = state.tokens.rotate(&token).await?;

    Ok(session_response(&state.tokens, pair, user))
}

async fn logout() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().insert(header::SET_COOKIE, HeaderValue::from_static(CLEAR_REFRESH_COOKIE));
    response
}

fn session_response(tokens: &TokenService, pair: TokenPair, user: UserPublic) -> Response {
    let mut response =
        Json(SessionEnvelope { access_token: pair.access_token, user }).into_response();

    // JWTs are base64url plus dots, always a valid header value.
    if let Ok(cookie) =
        HeaderValue::from_str(&refresh_cookie(&pair.refresh_token, tokens.refresh_ttl_seconds()))
    {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }

    response
}

fn refresh_cookie(token: &str, max_age_seconds: i64) -> String {
    format!("{REFRESH_COOKIE}={token}; Path=/; Max-Age={max_age_seconds}; HttpOnly; SameSite=Strict")
}

fn refresh_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers.get_all(header::COOKIE).iter().find_map(|value| {
        let raw = value.to_str().ok()?;
        raw.split(';').map(str::trim).find_map(|pair| {
            let (name, token) = pair.split_once('=')?;
            (name == REFRESH_COOKIE && !token.is_empty()).then(|| token.to_owned())
        })
    })
}

fn validate_display_name(display_name: &str) -> Result<(), AuthError> {
    if display_name.is_empty() {
        return Err(AuthError::validation("display name must not be empty"));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(AuthError::validation(format!(
            "display name must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }

    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}
