use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::UserListParams,
        repo::{get_preferences, save_preferences},
        repo_types::{NewUser, User},
        services::{
            check_password_strength, hash_password, is_valid_email, is_valid_phone,
            is_valid_username, verify_password, AdminUser, CurrentUser, JwtKeys,
        },
    },
    error::{unique_violation, AppError, AppResult},
    models::{
        LoginRequest, Message, PreferencesUpdate, ProfileUpdate, RefreshRequest,
        RegisterRequest, TokenPair, UserProfile,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me).patch(update_me))
        .route("/auth/me/preferences", axum::routing::patch(update_preferences))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/verify-email/:user_id", post(verify_email))
        .route("/auth/deactivate/:user_id", post(deactivate))
        .route("/auth/users", get(list_users))
        .route("/auth/users/:user_id", get(get_user))
}

fn check_profile_fields(update: &ProfileUpdate) -> AppResult<()> {
    if let Some(name) = &update.full_name {
        if name.chars().count() > 100 {
            return Err(AppError::BadRequest("Full name too long".into()));
        }
    }
    if let Some(phone) = &update.phone_number {
        if !is_valid_phone(phone) {
            return Err(AppError::BadRequest("Invalid phone number".into()));
        }
    }
    Ok(())
}

fn duplicate_user_detail(constraint: &str) -> &'static str {
    if constraint.contains("email") {
        "Email already registered"
    } else {
        "Username already registered"
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_username(&payload.username) {
        warn!(username = %payload.username, "invalid username");
        return Err(AppError::BadRequest("Invalid username".into()));
    }

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::BadRequest("Invalid email".into()));
    }

    if let Err(reason) = check_password_strength(&payload.password) {
        warn!("weak password");
        return Err(AppError::BadRequest(reason.into()));
    }

    check_profile_fields(&ProfileUpdate {
        full_name: payload.full_name.clone(),
        phone_number: payload.phone_number.clone(),
        date_of_birth: payload.date_of_birth,
    })?;

    if User::find_by_username(&state.db, &payload.username).await?.is_some() {
        warn!(username = %payload.username, "username already registered");
        return Err(AppError::BadRequest("Username already registered".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::BadRequest("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;

    let user = User::create(
        &state.db,
        NewUser {
            username: &payload.username,
            email: &payload.email,
            password_hash: &hash,
            full_name: payload.full_name.as_deref(),
            phone_number: payload.phone_number.as_deref(),
            date_of_birth: payload.date_of_birth,
        },
    )
    .await
    .map_err(|e| match unique_violation(&e) {
        Some(constraint) => {
            warn!(%constraint, "registration lost a uniqueness race");
            AppError::BadRequest(duplicate_user_detail(&constraint).into())
        }
        None => {
            error!(error = %e, "create user failed");
            AppError::Internal(e)
        }
    })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user.to_profile(None))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let login = payload.username_or_email.trim();
    if login.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Username/email and password are required".into()));
    }

    let invalid = || AppError::Unauthorized("Incorrect username/email or password".into());

    let user = match User::find_by_login(&state.db, login).await? {
        Some(u) => u,
        None => {
            warn!(login = %login, "login unknown user");
            return Err(invalid());
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    if !user.is_active {
        warn!(user_id = %user.id, "login inactive user");
        return Err(AppError::BadRequest("Inactive user".into()));
    }

    User::touch_last_login(&state.db, user.id).await?;

    let keys = JwtKeys::from_ref(&state);
    let pair = keys.issue_pair(&user)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(pair))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let invalid = || AppError::Unauthorized("Invalid refresh token".into());

    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        invalid()
    })?;

    let user = match User::find_by_id(&state.db, claims.sub).await? {
        Some(u) if u.is_active => u,
        _ => return Err(invalid()),
    };

    let pair = keys.issue_pair(&user)?;
    info!(user_id = %user.id, "tokens refreshed");
    Ok(Json(pair))
}

/// Tokens are stateless; the client discards them.
#[instrument(skip_all)]
pub async fn logout(CurrentUser(user): CurrentUser) -> Json<Message> {
    info!(user_id = %user.id, "user logged out");
    Json(Message::new("Successfully logged out"))
}

#[instrument(skip_all)]
pub async fn get_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<UserProfile>> {
    let preferences = get_preferences(&state.db, user.id).await?;
    Ok(Json(user.to_profile(preferences)))
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<UserProfile>> {
    check_profile_fields(&update)?;
    let updated = User::update_profile(&state.db, user.id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    info!(user_id = %updated.id, "profile updated");
    Ok(Json(updated.to_profile(None)))
}

#[instrument(skip_all)]
pub async fn update_preferences(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<PreferencesUpdate>,
) -> AppResult<Json<Message>> {
    let negative = |v: Option<f64>| v.is_some_and(|p| p < 0.0);
    if negative(update.price_range_min) || negative(update.price_range_max) {
        return Err(AppError::BadRequest("Price range must be non-negative".into()));
    }

    let mut preferences = get_preferences(&state.db, user.id)
        .await?
        .unwrap_or_default();
    preferences.apply(update);
    save_preferences(&state.db, user.id, &preferences).await?;

    info!(user_id = %user.id, "preferences updated");
    Ok(Json(Message::new("Preferences updated successfully")))
}

#[instrument(skip(state, admin))]
pub async fn verify_email(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    if !User::set_verified(&state.db, user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(admin_id = %admin.0.id, %user_id, "email verified");
    Ok(Json(Message::new("User email verified successfully")))
}

#[instrument(skip(state, admin))]
pub async fn deactivate(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    if !User::deactivate(&state.db, user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(admin_id = %admin.0.id, %user_id, "user deactivated");
    Ok(Json(Message::new("User deactivated successfully")))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(p): Query<UserListParams>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let users = User::list(&state.db, p.skip.max(0), p.limit.clamp(1, 500)).await?;
    Ok(Json(users.iter().map(|u| u.to_profile(None)).collect()))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserProfile>> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let preferences = get_preferences(&state.db, user.id).await?;
    Ok(Json(user.to_profile(preferences)))
}
