use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    auth::services::{OkResponse, SessionUser},
    error::ApiError,
    profile::repo::Profile,
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).put(put_profile))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<Profile>, ApiError> {
    let profile = Profile::load(state.records.as_ref(), &user.email).await?;
    Ok(Json(profile))
}

#[instrument(skip(state, payload))]
pub async fn put_profile(
    State(state): State<AppState>,
    user: SessionUser,
    Json(payload): Json<Value>,
) -> Result<Json<OkResponse>, ApiError> {
    let favorites = payload
        .get("favorites")
        .and_then(Value::as_array)
        .ok_or(ApiError::InvalidInput("favorites must be an array"))?;
    let favorites = favorites
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or(ApiError::InvalidInput("favorites must be an array of strings"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let profile = Profile { favorites };
    profile.save(state.records.as_ref(), &user.email).await?;

    info!(email = %user.email, count = profile.favorites.len(), "favorites saved");
    Ok(Json(OkResponse { ok: true }))
}
