use async_trait::async_trait;
use axum_extra::headers::authorization::Bearer;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use busline_core::identity::{IdentityError, IdentityProvider};
use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Resolves HS256 bearer tokens to the `sub` claim.
pub struct JwtIdentityProvider {
    key: DecodingKey,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve_user(&self, credential: &str) -> Result<String, IdentityError> {
        if credential.is_empty() {
            return Err(IdentityError::Missing);
        }
        let token_data = decode::<Claims>(credential, &self.key, &Validation::default())
            .map_err(|e| IdentityError::Rejected(e.to_string()))?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(IdentityError::Rejected("empty subject".into()));
        }
        Ok(token_data.claims.sub)
    }
}

/// The user id behind the request's bearer credential.
pub async fn acting_user(state: &AppState, bearer: &Bearer) -> Result<String, AppError> {
    Ok(state.identity.resolve_user(bearer.token()).await?)
}
