use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::app_user::{self, Role};
use crate::entity::onboarding_request::{self, RequestStatus};
use crate::service::Scripts;
use crate::sheet::Sheet;
use crate::templates::{OnboardingForm, Templates};

// ---------- auth / user requests ----------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Developer
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
}

// ---------- auth / user responses ----------

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<app_user::Model> for UserResponse {
    fn from(m: app_user::Model) -> Self {
        Self {
            id: m.id,
            username: m.username,
            email: m.email,
            role: m.role,
            is_active: m.is_active,
            last_login_at: m.last_login_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

// ---------- onboarding tool ----------

#[derive(Debug, Deserialize)]
pub struct ScriptsRequest {
    pub form: OnboardingForm,
    pub templates: Templates,
}

/// Generated scripts plus the dataset they belong to.
#[derive(Debug, Deserialize)]
pub struct ScriptBundleRequest {
    pub src_nm: String,
    pub dataset_nm: String,
    pub scripts: Scripts,
}

#[derive(Debug, Serialize)]
pub struct GitPushResponse {
    pub branch: String,
}

#[derive(Debug, Deserialize)]
pub struct RdsScriptRequest {
    pub script: String,
}

#[derive(Debug, Serialize)]
pub struct RdsScriptResponse {
    pub message: String,
}

// ---------- approval workflow ----------

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub dataset_name: String,
    pub scripts: Scripts,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub id: i32,
    pub request_id: Uuid,
    pub created_by: String,
    pub dataset_name: String,
    pub status: RequestStatus,
    pub storage_path: String,
    pub created_at: NaiveDateTime,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
}

impl From<onboarding_request::Model> for RequestResponse {
    fn from(m: onboarding_request::Model) -> Self {
        Self {
            id: m.id,
            request_id: m.request_id,
            created_by: m.created_by,
            dataset_name: m.dataset_name,
            status: m.status,
            storage_path: m.storage_path,
            created_at: m.created_at,
            approved_by: m.approved_by,
            approved_at: m.approved_at,
            rejection_reason: m.rejection_reason,
        }
    }
}

// ---------- configuration explorer ----------

#[derive(Debug, Deserialize)]
pub struct DatasetSearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DatasetFieldsResponse {
    pub fields: Sheet,
    /// Staging DDL the fields would generate.
    pub staging_ddl: String,
}
