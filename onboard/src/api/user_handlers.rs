use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::entity::app_user::{self, Role};

use super::{
    ApiErr, ApiState,
    dto::{
        ChangePasswordRequest, CreateUserRequest, ListUsersQuery, PaginatedResponse,
        UpdateUserRequest, UserResponse,
    },
    jwt::{AdminClaims, Claims},
};

/// Ways an admin account can stop being one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdminLoss {
    Demote,
    Delete,
}

impl AdminLoss {
    fn last_admin_msg(self) -> &'static str {
        match self {
            AdminLoss::Demote => "Cannot revoke admin from the last admin user",
            AdminLoss::Delete => "Cannot delete the last admin user",
        }
    }

    fn self_msg(self) -> &'static str {
        match self {
            AdminLoss::Demote => "Cannot revoke your own admin privileges",
            AdminLoss::Delete => "Cannot delete your own account",
        }
    }
}

/// At least one admin must remain, and nobody removes their own account or
/// admin role. The last-admin check runs first.
async fn guard_admin_loss(
    db: &DatabaseConnection,
    caller: &Claims,
    target: &app_user::Model,
    loss: AdminLoss,
) -> Result<(), ApiErr> {
    let target_is_admin = target.role == Role::Admin;
    if target_is_admin && count_admins(db).await? == 1 {
        return Err(ApiErr::conflict(loss.last_admin_msg()));
    }
    let self_applies = loss == AdminLoss::Delete || target_is_admin;
    if self_applies && caller.sub == target.id {
        return Err(ApiErr::conflict(loss.self_msg()));
    }
    Ok(())
}

async fn count_admins(db: &DatabaseConnection) -> Result<u64, ApiErr> {
    app_user::Entity::find()
        .filter(app_user::Column::Role.eq(Role::Admin))
        .count(db)
        .await
        .map_err(ApiErr::internal)
}

async fn find_user(db: &DatabaseConnection, id: Uuid) -> Result<app_user::Model, ApiErr> {
    app_user::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(ApiErr::internal)?
        .ok_or_else(|| ApiErr::not_found("User not found"))
}

pub async fn list_users(
    AdminClaims(_): AdminClaims,
    State(state): State<ApiState>,
    Query(params): Query<ListUsersQuery>,
) -> Result<Json<PaginatedResponse<UserResponse>>, ApiErr> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 100);

    let mut query = app_user::Entity::find().order_by_asc(app_user::Column::CreatedAt);
    if let Some(search) = params.search.as_deref().map(str::trim)
        && !search.is_empty()
    {
        query = query.filter(app_user::Column::Username.contains(search));
    }

    let paginator = query.paginate(&state.db, page_size);
    let total = paginator.num_items().await.map_err(ApiErr::internal)?;
    let data = paginator
        .fetch_page(page - 1)
        .await
        .map_err(ApiErr::internal)?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(PaginatedResponse {
        data,
        total,
        page,
        page_size,
    }))
}

pub async fn create_user(
    AdminClaims(claims): AdminClaims,
    State(state): State<ApiState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiErr> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiErr::bad_request("Username and password are required"));
    }
    let user = state
        .auth
        .create_user(username, &body.password, &body.email, body.role)
        .await?;
    tracing::info!(by = %claims.username, username = %user.username, role = user.role.as_str(), "user created");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn get_user(
    AdminClaims(_): AdminClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiErr> {
    Ok(Json(UserResponse::from(find_user(&state.db, id).await?)))
}

pub async fn update_user(
    AdminClaims(claims): AdminClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiErr> {
    let user = find_user(&state.db, id).await?;
    if body.role.is_some_and(|r| r != Role::Admin) {
        guard_admin_loss(&state.db, &claims, &user, AdminLoss::Demote).await?;
    }

    let mut active: app_user::ActiveModel = user.into();
    if let Some(email) = body.email {
        active.email = Set(email);
    }
    if let Some(role) = body.role {
        active.role = Set(role);
    }
    if let Some(is_active) = body.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    let updated = active.update(&state.db).await.map_err(ApiErr::internal)?;
    Ok(Json(UserResponse::from(updated)))
}

pub async fn change_password(
    AdminClaims(_): AdminClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<UserResponse>, ApiErr> {
    if body.password.is_empty() {
        return Err(ApiErr::bad_request("Password is required"));
    }
    let updated = state.auth.set_password(id, &body.password).await?;
    Ok(Json(UserResponse::from(updated)))
}

pub async fn delete_user(
    AdminClaims(claims): AdminClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiErr> {
    let user = find_user(&state.db, id).await?;
    guard_admin_loss(&state.db, &claims, &user, AdminLoss::Delete).await?;

    app_user::Entity::delete_by_id(id)
        .exec(&state.db)
        .await
        .map_err(ApiErr::internal)?;
    tracing::info!(by = %claims.username, username = %user.username, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
