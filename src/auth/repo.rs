use crate::auth::repo_types::{NewUser, User};
use crate::models::{Preferences, ProfileUpdate};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, phone_number, \
     date_of_birth, role, is_active, is_verified, created_at, updated_at, last_login";

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by username.
    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Login accepts either the username or the (lowercased) email.
    pub async fn find_by_login(
        db: &PgPool,
        username_or_email: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = lower($1) LIMIT 1"
        ))
        .bind(username_or_email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    pub async fn create(db: &PgPool, new: NewUser<'_>) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users
                (username, email, password_hash, full_name, phone_number, date_of_birth)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.full_name)
        .bind(new.phone_number)
        .bind(new.date_of_birth)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn touch_last_login(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Apply the present fields of `update`; returns `None` when the user is gone.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET full_name = COALESCE($2, full_name),
                   phone_number = COALESCE($3, phone_number),
                   date_of_birth = COALESCE($4, date_of_birth),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.full_name.as_deref())
        .bind(update.phone_number.as_deref())
        .bind(update.date_of_birth)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn set_verified(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET is_verified = TRUE, updated_at = now() WHERE id = $1",
        )
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn deactivate(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET is_active = FALSE, updated_at = now() WHERE id = $1",
        )
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list(db: &PgPool, skip: i64, limit: i64) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(skip)
        .fetch_all(db)
        .await?;
        Ok(users)
    }
}

pub async fn get_preferences(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Preferences>> {
    let row = sqlx::query_scalar::<_, Json<Preferences>>(
        "SELECT settings FROM user_preferences WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|Json(p)| p))
}

pub async fn save_preferences(
    db: &PgPool,
    user_id: Uuid,
    preferences: &Preferences,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_preferences (user_id, settings)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET settings = EXCLUDED.settings, updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(Json(preferences))
    .execute(db)
    .await?;
    Ok(())
}
