use chrono::{DateTime, Utc};
use profile_shared::api::UpdateProfileRequest;
use profile_shared::{Role, User};
use uuid::Uuid;

use crate::auth::VerifiedIdentity;
use crate::db::DbPool;
use crate::error::AppError;

/// `email` is owned by the identity provider and refreshed on every login;
/// profile edits go to `contact_email`, which takes precedence when read.
const USER_COLUMNS: &str = "id, COALESCE(contact_email, email) AS email, username, display_name, \
                            full_name, phone_number, profile_picture_url, role, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: Option<String>,
    display_name: Option<String>,
    full_name: Option<String>,
    phone_number: Option<String>,
    profile_picture_url: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let role = row.role.parse().unwrap_or_else(|e| {
            tracing::warn!(user_id = %row.id, "{}; treating as guest", e);
            Role::Guest
        });

        User {
            id: row.id,
            email: row.email,
            username: row.username,
            display_name: row.display_name,
            full_name: row.full_name,
            phone_number: row.phone_number,
            profile_picture_url: row.profile_picture_url,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn find_by_id(db: &DbPool, id: Uuid) -> Result<Option<User>, AppError> {
    let row: Option<UserRow> =
        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await?;

    Ok(row.map(User::from))
}

/// Creates the row on first authentication, otherwise refreshes the
/// provider-owned email. Keyed on the provider uid only, so a contact email
/// chosen by another user never blocks a login.
pub async fn upsert_from_identity(
    db: &DbPool,
    identity: &VerifiedIdentity,
) -> Result<User, AppError> {
    let row: UserRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO users (id, firebase_uid, email, full_name, display_name, profile_picture_url)
        VALUES ($1, $2, $3, $4, $4, $5)
        ON CONFLICT (firebase_uid) DO UPDATE
            SET email = EXCLUDED.email,
                updated_at = NOW()
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&identity.uid)
    .bind(&identity.email)
    .bind(&identity.name)
    .bind(&identity.picture)
    .fetch_one(db)
    .await
    .map_err(|e| AppError::from_unique_violation(e, "Email already belongs to another account"))?;

    Ok(row.into())
}

/// Applies the present fields of `req`; absent fields keep their value.
pub async fn update_profile(
    db: &DbPool,
    id: Uuid,
    req: &UpdateProfileRequest,
) -> Result<Option<User>, AppError> {
    if let Some(email) = &req.email {
        let taken: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM users
            WHERE id <> $1
              AND (LOWER(email) = LOWER($2) OR LOWER(contact_email) = LOWER($2))
            LIMIT 1
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_optional(db)
        .await?;

        if taken.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
    }

    let row: Option<UserRow> = sqlx::query_as(&format!(
        r#"
        UPDATE users
        SET username = COALESCE($1, username),
            contact_email = COALESCE($2, contact_email),
            phone_number = COALESCE($3, phone_number),
            profile_picture_url = COALESCE($4, profile_picture_url),
            display_name = COALESCE($5, display_name),
            updated_at = NOW()
        WHERE id = $6
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(&req.username)
    .bind(&req.email)
    .bind(&req.phone_number)
    .bind(&req.profile_picture_url)
    .bind(&req.display_name)
    .bind(id)
    .fetch_optional(db)
    .await
    .map_err(|e| AppError::from_unique_violation(e, "Email already registered"))?;

    Ok(row.map(User::from))
}
