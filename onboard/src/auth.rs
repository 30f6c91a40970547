use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use password_hash::SaltString;
use rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, SqlErr,
};
use uuid::Uuid;

use crate::entity::app_user::{self, Role};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("User not found")]
    NotFound,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("User is inactive")]
    Inactive,
    #[error("Username already exists")]
    Duplicate,
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("Hash error: {0}")]
    Hash(String),
}

pub struct Auth {
    db: DatabaseConnection,
}

impl Auth {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Verify username/password, stamping `last_login_at` on success.
    pub async fn authenticate_for_api(
        &self,
        username: &str,
        password: &str,
    ) -> Result<app_user::Model, AuthError> {
        let user = app_user::Entity::find()
            .filter(app_user::Column::Username.eq(username))
            .one(&self.db)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        let hash =
            PasswordHash::new(&user.password_hash).map_err(|e| AuthError::Hash(e.to_string()))?;

        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .map_err(|_| AuthError::InvalidPassword)?;

        let mut active: app_user::ActiveModel = user.into();
        active.last_login_at = Set(Some(Utc::now().naive_utc()));
        Ok(active.update(&self.db).await?)
    }

    /// Create a user with an Argon2-hashed password.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        email: &str,
        role: Role,
    ) -> Result<app_user::Model, AuthError> {
        let password_hash = Self::hash_password(password)?;
        let now = Utc::now().naive_utc();
        let user = app_user::ActiveModel {
            id: Set(Uuid::now_v7()),
            username: Set(username.to_owned()),
            email: Set(email.to_owned()),
            password_hash: Set(password_hash),
            role: Set(role),
            is_active: Set(true),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AuthError::Duplicate,
            _ => AuthError::Db(e),
        })?;
        Ok(user)
    }

    /// Replace the password hash of an existing user.
    pub async fn set_password(&self, id: Uuid, password: &str) -> Result<app_user::Model, AuthError> {
        let user = app_user::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AuthError::NotFound)?;
        let mut active: app_user::ActiveModel = user.into();
        active.password_hash = Set(Self::hash_password(password)?);
        active.updated_at = Set(Utc::now().naive_utc());
        Ok(active.update(&self.db).await?)
    }

    pub async fn count_users(&self) -> Result<u64, AuthError> {
        Ok(app_user::Entity::find().count(&self.db).await?)
    }

    /// Hash a plaintext password with Argon2id + a random salt.
    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .to_string();
        Ok(hash)
    }
}
