use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl RequestStatus {
    /// Name of the object-store folder holding scripts in this state.
    pub fn folder(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "onboarding_request")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_by: String,
    pub dataset_name: String,
    #[sea_orm(unique)]
    pub request_id: Uuid,
    pub status: RequestStatus,
    /// Object-store prefix of the request's scripts: `{root}/{status}/{request_id}`
    pub storage_path: String,
    pub created_at: DateTime,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime>,
    pub rejection_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
