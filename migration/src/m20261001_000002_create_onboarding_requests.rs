use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OnboardingRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OnboardingRequest::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::CreatedBy)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::DatasetName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::RequestId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::StoragePath)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::ApprovedBy)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::ApprovedAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OnboardingRequest::RejectionReason)
                            .text()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_onboarding_request_status")
                    .table(OnboardingRequest::Table)
                    .col(OnboardingRequest::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OnboardingRequest::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OnboardingRequest {
    Table,
    Id,
    CreatedBy,
    DatasetName,
    RequestId,
    Status,
    StoragePath,
    CreatedAt,
    ApprovedBy,
    ApprovedAt,
    RejectionReason,
}
