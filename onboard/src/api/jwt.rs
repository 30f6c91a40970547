use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiState;
use crate::entity::app_user::Role;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id (UUID, stored as string in JWT)
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    /// Unix timestamp expiry
    pub exp: u64,
}

impl Claims {
    /// Admins pass every role gate.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role || self.role == Role::Admin
    }
}

pub fn encode_jwt(claims: &Claims, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

fn extract_bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn claims_from_parts(parts: &Parts, secret: &str) -> Result<Claims, (StatusCode, &'static str)> {
    let token = extract_bearer(parts).ok_or((
        StatusCode::UNAUTHORIZED,
        "Missing or invalid Authorization header",
    ))?;

    decode_jwt(token, secret).map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired token"))
}

/// Extractor: validates Bearer token (any authenticated user).
pub struct AuthClaims(pub Claims);

impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
    ApiState: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = ApiState::from_ref(state);
        Ok(AuthClaims(claims_from_parts(parts, &state.jwt_secret)?))
    }
}

macro_rules! role_extractor {
    ($(#[$meta:meta])* $name:ident, $role:expr, $denied:literal) => {
        $(#[$meta])*
        pub struct $name(pub Claims);

        impl<S> FromRequestParts<S> for $name
        where
            S: Send + Sync,
            ApiState: FromRef<S>,
        {
            type Rejection = (StatusCode, &'static str);

            async fn from_request_parts(
                parts: &mut Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                let state = ApiState::from_ref(state);
                let claims = claims_from_parts(parts, &state.jwt_secret)?;
                if !claims.has_role($role) {
                    return Err((StatusCode::FORBIDDEN, $denied));
                }
                Ok($name(claims))
            }
        }
    };
}

role_extractor!(
    /// Extractor: onboarding tool and request submission.
    DeveloperClaims,
    Role::Developer,
    "Developer access required"
);
role_extractor!(
    /// Extractor: configuration explorer.
    AnalystClaims,
    Role::Analyst,
    "Analyst access required"
);
role_extractor!(
    /// Extractor: approval queue.
    ApproverClaims,
    Role::Approver,
    "Approver access required"
);
role_extractor!(
    /// Extractor: user management and the full request list.
    AdminClaims,
    Role::Admin,
    "Admin access required"
);
