use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::set_header::response::SetResponseHeaderLayer;

use crate::auth::{Auth, AuthError};
use crate::catalog::{Catalog, CatalogError};
use crate::config::AppConfig;
use crate::git::GitError;
use crate::service::{OnboardingService, ServiceError};
use crate::storage::{ScriptStore, StorageError};
use crate::templates::TemplateError;
use crate::upload::UploadError;
use crate::workflow::{Workflow, WorkflowError};

pub mod auth_handlers;
pub mod catalog_handlers;
pub mod dto;
pub mod jwt;
pub mod onboarding_handlers;
pub mod request_handlers;
pub mod user_handlers;

/// Upper bound on sample uploads.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// ---------- shared state ----------

#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<Auth>,
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub onboarding: OnboardingService,
    pub workflow: Workflow,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl ApiState {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<AppConfig>,
        store: Arc<dyn ScriptStore>,
        jwt_secret: String,
        jwt_expiry_hours: u64,
    ) -> Self {
        let catalog = Catalog::new(db.clone(), config.clone());
        Self {
            auth: Arc::new(Auth::new(db.clone())),
            onboarding: OnboardingService::new(config.clone(), catalog),
            workflow: Workflow::new(db.clone(), store),
            db,
            config,
            jwt_secret,
            jwt_expiry_hours,
        }
    }
}

// ---------- error type ----------

/// A JSON error response: `{"error": "..."}` with an HTTP status.
#[derive(Debug)]
pub struct ApiErr(StatusCode, String);

impl ApiErr {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(status, msg.into())
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "request failed");
        Self(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self(StatusCode::FORBIDDEN, msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self(StatusCode::CONFLICT, msg.into())
    }

    pub fn status(&self) -> StatusCode {
        self.0
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.1 });
        (self.0, Json(body)).into_response()
    }
}

impl From<TemplateError> for ApiErr {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::MissingField(_) => ApiErr::bad_request(e.to_string()),
            TemplateError::MissingTable(_) => ApiErr::internal(e),
        }
    }
}

impl From<CatalogError> for ApiErr {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Template(t) => t.into(),
            CatalogError::Db(_) => ApiErr::internal(e),
        }
    }
}

impl From<ServiceError> for ApiErr {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Template(t) => t.into(),
            ServiceError::Catalog(c) => c.into(),
            ServiceError::Upload(UploadError::Unsupported) => {
                ApiErr::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
            }
            ServiceError::Upload(_) | ServiceError::MissingUpload | ServiceError::EmptyMetadata => {
                ApiErr::bad_request(e.to_string())
            }
            ServiceError::Git(GitError::MissingCredentials | GitError::MissingRepo) => {
                ApiErr::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ServiceError::Git(_) => ApiErr::new(StatusCode::BAD_GATEWAY, e.to_string()),
            ServiceError::Db(_) | ServiceError::Zip(_) => ApiErr::internal(e),
        }
    }
}

impl From<WorkflowError> for ApiErr {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::NotFound | WorkflowError::Storage(StorageError::NotFound(_)) => {
                ApiErr::not_found(e.to_string())
            }
            WorkflowError::NotPending(_) => ApiErr::conflict(e.to_string()),
            WorkflowError::MissingField(_) => ApiErr::bad_request(e.to_string()),
            WorkflowError::Upload(_) | WorkflowError::Move { .. } | WorkflowError::Storage(_) => {
                tracing::error!(error = %e, "storage failure");
                ApiErr::new(StatusCode::BAD_GATEWAY, e.to_string())
            }
            WorkflowError::Db(_) => ApiErr::internal(e),
        }
    }
}

impl From<AuthError> for ApiErr {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Duplicate => ApiErr::conflict(e.to_string()),
            AuthError::NotFound => ApiErr::not_found(e.to_string()),
            _ => ApiErr::internal(e),
        }
    }
}

// ---------- router ----------

pub fn api_router(state: ApiState) -> Router {
    let allowed_origins: Vec<HeaderValue> = std::env::var("ONB_CORS_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = if allowed_origins.is_empty() {
        CorsLayer::new() // no origins allowed = same-origin only
    } else {
        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .expose_headers([header::CONTENT_DISPOSITION])
            .allow_credentials(true)
    };

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .nest("/api/v1", api_v1())
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(NormalizePathLayer::trim_trailing_slash())
        .with_state(state)
}

fn api_v1() -> Router<ApiState> {
    Router::new()
        // auth
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/me", get(auth_handlers::me))
        .route("/auth/bootstrap", post(auth_handlers::bootstrap))
        // users
        .route(
            "/users",
            get(user_handlers::list_users).post(user_handlers::create_user),
        )
        .route(
            "/users/{id}",
            get(user_handlers::get_user)
                .put(user_handlers::update_user)
                .delete(user_handlers::delete_user),
        )
        .route("/users/{id}/password", put(user_handlers::change_password))
        // onboarding tool
        .route("/onboarding/options", get(onboarding_handlers::options))
        .route(
            "/onboarding/templates",
            post(onboarding_handlers::generate_templates)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/onboarding/scripts", post(onboarding_handlers::generate_scripts))
        .route("/onboarding/scripts/zip", post(onboarding_handlers::download_zip))
        .route("/onboarding/scripts/git", post(onboarding_handlers::push_to_git))
        .route("/onboarding/scripts/rds", post(onboarding_handlers::insert_into_rds))
        // approval workflow
        .route(
            "/requests",
            get(request_handlers::list_requests).post(request_handlers::submit_request),
        )
        .route("/requests/pending", get(request_handlers::list_pending))
        .route("/requests/{request_id}", get(request_handlers::get_request))
        .route(
            "/requests/{request_id}/scripts",
            get(request_handlers::get_request_scripts),
        )
        .route(
            "/requests/{request_id}/approve",
            post(request_handlers::approve_request),
        )
        .route(
            "/requests/{request_id}/reject",
            post(request_handlers::reject_request),
        )
        // configuration explorer
        .route("/catalog/datasets", get(catalog_handlers::search_datasets))
        .route(
            "/catalog/datasets/{src_nm}/{dataset_nm}/fields",
            get(catalog_handlers::dataset_fields),
        )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::entity::app_user::{self, Role};
    use crate::storage::MemoryScriptStore;
    use axum::body::Body;
    use chrono::Utc;
    use migration::MigratorTrait as _;
    use sea_orm::{ActiveModelTrait, Database, Set};
    use uuid::Uuid;

    pub const JWT_SECRET: &str = "test-jwt-secret-key-32-chars-pad";

    pub async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    pub fn make_state(db: DatabaseConnection) -> ApiState {
        ApiState::new(
            db,
            Arc::new(AppConfig::default()),
            Arc::new(MemoryScriptStore::new("onboarding")),
            JWT_SECRET.to_string(),
            1,
        )
    }

    pub fn token(id: Uuid, username: &str, role: Role) -> String {
        let claims = jwt::Claims {
            sub: id,
            username: username.to_string(),
            role,
            exp: (Utc::now().timestamp() as u64) + 3600,
        };
        jwt::encode_jwt(&claims, JWT_SECRET).unwrap()
    }

    pub async fn insert_user(db: &DatabaseConnection, id: Uuid, username: &str, role: Role) {
        let now = Utc::now().naive_utc();
        app_user::ActiveModel {
            id: Set(id),
            username: Set(username.to_string()),
            email: Set(format!("{username}@example.com")),
            password_hash: Set("hash".to_string()),
            role: Set(role),
            is_active: Set(true),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
    }

    pub fn json_body(value: serde_json::Value) -> Body {
        Body::from(serde_json::to_string(&value).unwrap())
    }

    /// Bearer-authenticated request, JSON-encoded when `body` is given.
    pub fn authed(
        method: axum::http::Method,
        uri: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> axum::http::Request<Body> {
        let builder = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"));
        match body {
            Some(v) => builder
                .header("Content-Type", "application/json")
                .body(json_body(v))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
