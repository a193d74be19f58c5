use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Missing credentials")]
    Missing,
    #[error("Credentials rejected: {0}")]
    Rejected(String),
}

/// Supplies the acting user id for every write the engine performs.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the bearer credential presented by the caller to a user id
    async fn resolve_user(&self, credential: &str) -> Result<String, IdentityError>;
}

/// Accepts any non-empty credential as the user id itself. Used for local runs and tests.
pub struct PassthroughIdentity;

#[async_trait]
impl IdentityProvider for PassthroughIdentity {
    async fn resolve_user(&self, credential: &str) -> Result<String, IdentityError> {
        let user = credential.trim();
        if user.is_empty() {
            return Err(IdentityError::Missing);
        }
        tracing::debug!("Passthrough identity resolved user {}", user);
        Ok(user.to_string())
    }
}
