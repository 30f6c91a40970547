//! Approval workflow: submitted scripts wait in `pending` until an approver
//! moves the request to `approved` or `rejected`.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::onboarding_request::{self, RequestStatus};
use crate::service::Scripts;
use crate::storage::{ScriptStore, StorageError, StoredScript, request_prefix};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Request not found")]
    NotFound,
    #[error("Request is already {0}")]
    NotPending(&'static str),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Failed to upload scripts: {0}")]
    Upload(StorageError),
    #[error("Request was {status} but scripts could not be moved: {source}")]
    Move {
        status: &'static str,
        source: StorageError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

/// A script as shown to approvers.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptContent {
    pub script_type: String,
    pub key: String,
    pub content: String,
}

#[derive(Clone)]
pub struct Workflow {
    db: DatabaseConnection,
    store: Arc<dyn ScriptStore>,
}

impl Workflow {
    pub fn new(db: DatabaseConnection, store: Arc<dyn ScriptStore>) -> Self {
        Self { db, store }
    }

    /// Upload every script under `pending`, then record the request.
    /// No row is written unless all uploads succeed.
    #[tracing::instrument(skip(self, scripts))]
    pub async fn submit(
        &self,
        created_by: &str,
        dataset_name: &str,
        scripts: &Scripts,
    ) -> Result<onboarding_request::Model, WorkflowError> {
        if dataset_name.trim().is_empty() {
            return Err(WorkflowError::MissingField("Dataset Name"));
        }
        let request_id = Uuid::new_v4();
        let id = request_id.to_string();
        for (script_type, content) in scripts.by_storage_type() {
            self.store
                .put_script(&id, dataset_name, script_type, content)
                .await
                .map_err(WorkflowError::Upload)?;
        }

        let storage_path = request_prefix(self.store.root_prefix(), RequestStatus::Pending, &id);
        let model = onboarding_request::ActiveModel {
            created_by: Set(created_by.to_string()),
            dataset_name: Set(dataset_name.to_string()),
            request_id: Set(request_id),
            status: Set(RequestStatus::Pending),
            storage_path: Set(storage_path),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        tracing::info!(request_id = %id, "request submitted");
        Ok(model)
    }

    pub async fn list_pending(&self) -> Result<Vec<onboarding_request::Model>, WorkflowError> {
        Ok(onboarding_request::Entity::find()
            .filter(onboarding_request::Column::Status.eq(RequestStatus::Pending))
            .order_by_desc(onboarding_request::Column::CreatedAt)
            .order_by_desc(onboarding_request::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn list_all(&self) -> Result<Vec<onboarding_request::Model>, WorkflowError> {
        Ok(onboarding_request::Entity::find()
            .order_by_desc(onboarding_request::Column::CreatedAt)
            .order_by_desc(onboarding_request::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn list_by_creator(
        &self,
        created_by: &str,
    ) -> Result<Vec<onboarding_request::Model>, WorkflowError> {
        Ok(onboarding_request::Entity::find()
            .filter(onboarding_request::Column::CreatedBy.eq(created_by))
            .order_by_desc(onboarding_request::Column::CreatedAt)
            .order_by_desc(onboarding_request::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get(&self, request_id: Uuid) -> Result<onboarding_request::Model, WorkflowError> {
        onboarding_request::Entity::find()
            .filter(onboarding_request::Column::RequestId.eq(request_id))
            .one(&self.db)
            .await?
            .ok_or(WorkflowError::NotFound)
    }

    /// Scripts with their contents, read from the request's current folder.
    pub async fn scripts(&self, request_id: Uuid) -> Result<Vec<ScriptContent>, WorkflowError> {
        let request = self.get(request_id).await?;
        let id = request_id.to_string();
        let listed: Vec<StoredScript> = self.store.list_scripts(&id, request.status).await?;
        let mut out = Vec::with_capacity(listed.len());
        for script in listed {
            let content = self
                .store
                .get_script(&id, &script.script_type, request.status)
                .await?;
            out.push(ScriptContent {
                script_type: script.script_type,
                key: script.key,
                content,
            });
        }
        Ok(out)
    }

    /// Move `pending` to `target` with one conditional UPDATE, so two
    /// concurrent decisions cannot both succeed.
    async fn transition(
        &self,
        request_id: Uuid,
        target: RequestStatus,
        approved_by: Option<&str>,
        reason: Option<&str>,
    ) -> Result<onboarding_request::Model, WorkflowError> {
        let mut update = onboarding_request::Entity::update_many()
            .col_expr(onboarding_request::Column::Status, Expr::value(target))
            .col_expr(
                onboarding_request::Column::StoragePath,
                Expr::value(request_prefix(
                    self.store.root_prefix(),
                    target,
                    &request_id.to_string(),
                )),
            );
        if let Some(approver) = approved_by {
            update = update
                .col_expr(onboarding_request::Column::ApprovedBy, Expr::value(approver))
                .col_expr(
                    onboarding_request::Column::ApprovedAt,
                    Expr::value(Utc::now().naive_utc()),
                );
        }
        if let Some(reason) = reason {
            update = update.col_expr(onboarding_request::Column::RejectionReason, Expr::value(reason));
        }

        let result = update
            .filter(onboarding_request::Column::RequestId.eq(request_id))
            .filter(onboarding_request::Column::Status.eq(RequestStatus::Pending))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            let current = self.get(request_id).await?;
            return Err(WorkflowError::NotPending(current.status.folder()));
        }

        let id = request_id.to_string();
        if let Err(source) = self
            .store
            .move_scripts(&id, RequestStatus::Pending, target)
            .await
        {
            tracing::error!(request_id = %id, error = %source, "status changed but scripts were not moved");
            return Err(WorkflowError::Move {
                status: target.folder(),
                source,
            });
        }
        tracing::info!(request_id = %id, status = target.folder(), "request decided");
        self.get(request_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn approve(
        &self,
        request_id: Uuid,
        approver: &str,
    ) -> Result<onboarding_request::Model, WorkflowError> {
        self.transition(request_id, RequestStatus::Approved, Some(approver), None)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        reason: &str,
    ) -> Result<onboarding_request::Model, WorkflowError> {
        if reason.trim().is_empty() {
            return Err(WorkflowError::MissingField("Rejection reason"));
        }
        self.transition(request_id, RequestStatus::Rejected, None, Some(reason.trim()))
            .await
    }
}
