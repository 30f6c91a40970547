use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use sea_orm::EntityTrait;

use crate::entity::app_user::{self, Role};

use super::{
    ApiErr, ApiState,
    dto::{BootstrapRequest, LoginRequest, LoginResponse, UserResponse},
    jwt::{AuthClaims, Claims, encode_jwt},
};

fn issue_token(state: &ApiState, user: app_user::Model) -> Result<LoginResponse, ApiErr> {
    let exp = (Utc::now().timestamp() as u64) + state.jwt_expiry_hours * 3600;
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        role: user.role,
        exp,
    };

    let token = encode_jwt(&claims, &state.jwt_secret).map_err(ApiErr::internal)?;
    Ok(LoginResponse {
        token,
        user: UserResponse::from(user),
    })
}

pub async fn login(
    State(state): State<ApiState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiErr> {
    let user = state
        .auth
        .authenticate_for_api(&body.username, &body.password)
        .await
        .map_err(|e| {
            tracing::warn!(username = %body.username, reason = %e, "login rejected");
            ApiErr::new(StatusCode::UNAUTHORIZED, "Invalid credentials")
        })?;

    Ok(Json(issue_token(&state, user)?))
}

pub async fn me(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
) -> Result<Json<UserResponse>, ApiErr> {
    let user = app_user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("User not found"))?;

    Ok(Json(UserResponse::from(user)))
}

/// Create the first admin account. Refused once any user exists.
pub async fn bootstrap(
    State(state): State<ApiState>,
    Json(body): Json<BootstrapRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiErr> {
    if state.auth.count_users().await? > 0 {
        return Err(ApiErr::conflict("Users already exist"));
    }
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(ApiErr::bad_request("Username and password are required"));
    }

    let user = state
        .auth
        .create_user(body.username.trim(), &body.password, &body.email, Role::Admin)
        .await?;
    tracing::warn!(username = %user.username, "bootstrapped first admin");

    Ok((StatusCode::CREATED, Json(issue_token(&state, user)?)))
}
