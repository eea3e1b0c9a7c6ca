use axum::{extract::State, Extension, Json};
use profile_shared::api::{AuthResponse, LoginRequest};
use profile_shared::User;

use crate::auth::{create_session_token, AuthUser, IdentityProvider, VerifiedIdentity};
use crate::db::users;
use crate::error::AppError;
use crate::extract::ValidatedJson;
use crate::routes::AppState;

/// Resolves the login request to a provider-verified identity.
///
/// A supplied ID token must belong to the email being logged in; without one
/// the credentials are exchanged with the provider first.
pub async fn authenticate(
    identity: &dyn IdentityProvider,
    req: &LoginRequest,
) -> Result<VerifiedIdentity, AppError> {
    let id_token = match &req.id_token {
        Some(token) => token.clone(),
        None => identity.sign_in_with_password(&req.email, &req.password).await?,
    };

    let verified = identity.verify_id_token(&id_token).await?;

    if !verified.email.eq_ignore_ascii_case(&req.email) {
        tracing::debug!(uid = %verified.uid, "ID token email does not match login email");
        return Err(AppError::Unauthorized);
    }

    Ok(verified)
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let verified = authenticate(state.identity.as_ref(), &req).await?;

    // First login creates the row
    let user = users::upsert_from_identity(&state.db, &verified).await?;

    let access_token = create_session_token(
        user.id,
        &user.email,
        user.role,
        &state.config.session_secret,
        state.config.session_expires_in,
    )?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        access_token,
        expires_in: state.config.session_expires_in,
        user,
    }))
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>, AppError> {
    let user = users::find_by_id(&state.db, user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(user))
}
