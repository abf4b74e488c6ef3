use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use greenlight_types::api::{
    ChangePasswordRequest, Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    UpdateProfileRequest,
};
use greenlight_types::models::User;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let name_len = req.username.chars().count();
    if !(3..=32).contains(&name_len) {
        return Err(ApiError::bad_request("username must be 3-32 characters"));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    let user_id = Uuid::new_v4();
    let username = req.username.clone();
    blocking(&state, move |db| {
        let password_hash = hash_password(&req.password)?;
        let id = user_id.to_string();
        let display_name = req.display_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
        // The unique index decides concurrent registrations for one name.
        if !db.create_user(&id, &req.username, &password_hash, display_name)? {
            return Err(ApiError::conflict("username taken"));
        }
        db.ensure_preferences(&id)?;
        Ok(())
    })
    .await?;

    info!("Registered {} ({})", username, user_id);
    let token = create_token(&state.jwt_secret, user_id, &username, state.token_ttl_days)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = blocking(&state, move |db| {
        let user = db.get_user_by_username(&req.username)?.ok_or(ApiError::Unauthorized)?;

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(user)
    })
    .await?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;
    let token = create_token(&state.jwt_secret, user_id, &user.username, state.token_ttl_days)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<User>> {
    let user = blocking(&state, move |db| {
        db.get_user_by_id(&claims.sub.to_string())?.ok_or(ApiError::NotFound)
    })
    .await?;
    Ok(Json(user.into_user()))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let user = blocking(&state, move |db| {
        let id = claims.sub.to_string();
        if !db.update_profile(&id, req.display_name.as_deref(), req.avatar_url.as_deref())? {
            return Err(ApiError::NotFound);
        }
        db.get_user_by_id(&id)?.ok_or(ApiError::NotFound)
    })
    .await?;
    Ok(Json(user.into_user()))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    if req.new_password.chars().count() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    let id = claims.sub.to_string();
    blocking(&state, move |db| {
        let user = db.get_user_by_id(&id)?.ok_or(ApiError::NotFound)?;
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
        Argon2::default()
            .verify_password(req.current_password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Forbidden)?;

        let password_hash = hash_password(&req.new_password)?;
        if !db.update_password(&id, &password_hash)? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;

    info!("Password changed for {}", claims.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Argon2id with a fresh salt.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str, ttl_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validates signature and expiry. `None` for anything unusable.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
