use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::entity::app_user::Role;
use crate::entity::onboarding_request;
use crate::workflow::ScriptContent;

use super::{
    ApiErr, ApiState,
    dto::{RejectRequest, RequestResponse, SubmitRequest},
    jwt::{ApproverClaims, AuthClaims, Claims, DeveloperClaims},
};

fn to_responses(rows: Vec<onboarding_request::Model>) -> Vec<RequestResponse> {
    rows.into_iter().map(RequestResponse::from).collect()
}

/// Approvers see every request; everyone else only their own.
fn ensure_visible(claims: &Claims, request: &onboarding_request::Model) -> Result<(), ApiErr> {
    if claims.has_role(Role::Approver) || request.created_by == claims.username {
        Ok(())
    } else {
        Err(ApiErr::forbidden("Not allowed to view this request"))
    }
}

pub async fn submit_request(
    DeveloperClaims(claims): DeveloperClaims,
    State(state): State<ApiState>,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<RequestResponse>), ApiErr> {
    let request = state
        .workflow
        .submit(&claims.username, body.dataset_name.trim(), &body.scripts)
        .await?;
    Ok((StatusCode::CREATED, Json(RequestResponse::from(request))))
}

/// Admins get the full history; other users their own submissions.
pub async fn list_requests(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
) -> Result<Json<Vec<RequestResponse>>, ApiErr> {
    let rows = if claims.role == Role::Admin {
        state.workflow.list_all().await?
    } else {
        state.workflow.list_by_creator(&claims.username).await?
    };
    Ok(Json(to_responses(rows)))
}

pub async fn list_pending(
    ApproverClaims(_): ApproverClaims,
    State(state): State<ApiState>,
) -> Result<Json<Vec<RequestResponse>>, ApiErr> {
    Ok(Json(to_responses(state.workflow.list_pending().await?)))
}

pub async fn get_request(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestResponse>, ApiErr> {
    let request = state.workflow.get(request_id).await?;
    ensure_visible(&claims, &request)?;
    Ok(Json(RequestResponse::from(request)))
}

pub async fn get_request_scripts(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Vec<ScriptContent>>, ApiErr> {
    let request = state.workflow.get(request_id).await?;
    ensure_visible(&claims, &request)?;
    Ok(Json(state.workflow.scripts(request_id).await?))
}

pub async fn approve_request(
    ApproverClaims(claims): ApproverClaims,
    State(state): State<ApiState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestResponse>, ApiErr> {
    let request = state.workflow.approve(request_id, &claims.username).await?;
    Ok(Json(RequestResponse::from(request)))
}

pub async fn reject_request(
    ApproverClaims(claims): ApproverClaims,
    State(state): State<ApiState>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<RequestResponse>, ApiErr> {
    let request = state.workflow.reject(request_id, &body.reason).await?;
    tracing::info!(approver = %claims.username, %request_id, "request rejected");
    Ok(Json(RequestResponse::from(request)))
}
