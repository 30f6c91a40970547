pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_app_users;
mod m20261001_000002_create_onboarding_requests;
mod m20261003_000003_create_sys_config_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_app_users::Migration),
            Box::new(m20261001_000002_create_onboarding_requests::Migration),
            Box::new(m20261003_000003_create_sys_config_tables::Migration),
        ]
    }
}
