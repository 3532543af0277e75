use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        codes,
        dto::{
            AuthResponse, LoginRequest, OkResponse, PublicUser, RegisterRequest,
            ResetPasswordRequest, SendCodeRequest, SessionResponse,
        },
        repo::{now_rfc3339, UserRecord},
        services::{
            clear_session_cookie, hash_password, is_valid_email, session_cookie,
            verify_password, SessionKeys, SESSION_COOKIE,
        },
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/send-verification", post(send_verification))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/session", get(session))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::InvalidInput("Invalid email"));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::InvalidInput("Password too short"));
    }
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidInput("Name must not be empty"));
    }

    // Code first: a guessed code must not probe whether an email is taken.
    codes::check(state.secrets.as_ref(), &payload.email, &payload.code).await?;

    if UserRecord::find_by_email(state.records.as_ref(), &payload.email)
        .await?
        .is_some()
    {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::EmailAlreadyRegistered);
    }

    let hash = hash_password(&payload.password)?;
    let user = UserRecord::new(name, &payload.email, hash)?;
    let stored = user.create(state.records.as_ref()).await?;
    codes::consume(state.secrets.as_ref(), &payload.email).await?;

    info!(email = %user.email, path = %stored.path, "user registered");
    Ok(Json(AuthResponse {
        user: PublicUser {
            name: user.name,
            email: user.email,
        },
    }))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::InvalidInput("Invalid email"));
    }

    // Unknown email and wrong password answer identically.
    let resolved = UserRecord::find_by_email(state.records.as_ref(), &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            ApiError::InvalidCredentials
        })?;
    let user = UserRecord::fetch(state.records.as_ref(), &resolved.path).await?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let keys = SessionKeys::from_ref(&state);
    let token = keys.issue(&user.email, &user.name)?;
    let cookie = session_cookie(token, state.config.session.secure_cookies, keys.ttl);

    info!(email = %user.email, "user logged in");
    Ok((
        jar.add(cookie),
        Json(AuthResponse {
            user: PublicUser {
                name: user.name,
                email: user.email,
            },
        }),
    ))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<OkResponse>) {
    (
        jar.add(clear_session_cookie(state.config.session.secure_cookies)),
        Json(OkResponse { ok: true }),
    )
}

#[instrument(skip(state, payload))]
pub async fn send_verification(
    State(state): State<AppState>,
    Json(payload): Json<SendCodeRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::InvalidInput("Invalid email"));
    }
    let mailer = state.mailer.as_ref().ok_or(ApiError::MailNotConfigured)?;

    let code = codes::issue(state.secrets.as_ref(), &email, state.config.code_ttl_seconds).await?;

    // The stored code survives a dispatch failure: delivery may still have
    // gone through asynchronously, and the code expires on its own.
    if let Err(e) = mailer.send_verification_code(&email, &code).await {
        error!(error = %e, email = %email, "verification mail dispatch failed");
        return Err(ApiError::Upstream(e));
    }

    info!(email = %email, "verification code sent");
    Ok(Json(OkResponse { ok: true }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ResetPasswordRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::InvalidInput("Invalid email"));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::InvalidInput("Password too short"));
    }

    codes::check(state.secrets.as_ref(), &payload.email, &payload.code).await?;

    let resolved = UserRecord::find_by_email(state.records.as_ref(), &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "reset for unknown account");
            ApiError::AccountNotFound
        })?;

    let mut user = UserRecord::fetch(state.records.as_ref(), &resolved.path).await?;
    user.password_hash = hash_password(&payload.password)?;
    user.updated_at = Some(now_rfc3339()?);
    // Same physical path as resolved, so the account does not fork.
    user.overwrite(state.records.as_ref(), &resolved.path).await?;
    codes::consume(state.secrets.as_ref(), &payload.email).await?;

    info!(email = %payload.email, path = %resolved.path, "password reset");
    Ok(Json(OkResponse { ok: true }))
}

#[instrument(skip(state, jar))]
pub async fn session(State(state): State<AppState>, jar: CookieJar) -> Json<SessionResponse> {
    let keys = SessionKeys::from_ref(&state);
    let user = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| keys.verify(cookie.value()))
        .map(|claims| PublicUser {
            name: claims.name,
            email: claims.sub,
        });
    Json(SessionResponse {
        authenticated: user.is_some(),
        user,
    })
}
