use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, warn};

use tessel_types::api::Claims;
use tessel_types::models::Identity;

use crate::error::ChatError;
use crate::store::Store;

/// Issue a signed credential for `identity`, valid for `ttl_days`.
pub fn create_token(secret: &str, identity: &Identity, ttl_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: identity.id,
        username: identity.username.clone(),
        role: identity.role.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify signature and expiry. Shared with the REST bearer middleware.
pub fn decode_claims(secret: &str, token: &str) -> Result<Claims, ChatError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("Rejected credential: {}", e);
        ChatError::AuthFailed
    })
}

/// Verifies the credential a client presents when opening its connection.
#[derive(Clone)]
pub struct SessionAuthenticator {
    jwt_secret: String,
    store: Store,
}

impl SessionAuthenticator {
    pub fn new(jwt_secret: impl Into<String>, store: Store) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            store,
        }
    }

    /// Resolve a credential to an identity.
    ///
    /// Id comes from the verified token; username and role are re-read from
    /// the store, so a role change or deleted account takes effect on the
    /// next connection whatever the token says.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Identity, ChatError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ChatError::AuthFailed)?;
        let claims = decode_claims(&self.jwt_secret, token)?;

        let user_id = claims.sub;
        let user = self
            .store
            .call(move |db| db.get_user_by_id(user_id))
            .await
            .map_err(|e| {
                warn!("User lookup during authentication failed: {}", e);
                ChatError::AuthFailed
            })?
            .ok_or_else(|| {
                warn!("Credential for unknown user {}", user_id);
                ChatError::AuthFailed
            })?;

        Ok(Identity::new(user.id, user.username, &user.role))
    }
}
