use axum::{extract::State, Extension, Json};
use profile_shared::api::UpdateProfileRequest;
use profile_shared::User;

use crate::auth::AuthUser;
use crate::db::users;
use crate::error::AppError;
use crate::extract::ValidatedJson;
use crate::routes::AppState;

/// GET /api/v1/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>, AppError> {
    let profile = users::find_by_id(&state.db, user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(profile))
}

/// PATCH /api/v1/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    if req.is_empty() {
        return get_profile(State(state), Extension(user)).await;
    }

    let profile = users::update_profile(&state.db, user.id, &req)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::debug!(user_id = %user.id, "Profile updated");

    Ok(Json(profile))
}
