/// Authentication extractors and utilities
///
/// Requests carry an HS256 bearer JWT whose `sub` claim names the principal.
/// Roles are not checked here: every admin operation resolves the caller's
/// role from the store when it runs.
use crate::{
    admin::Principal,
    api::middleware::{extract_bearer_token, extract_client_ip, extract_user_agent},
    context::AppContext,
    error::DirectoryError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

/// Claims carried by directory access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Authenticated caller of an admin endpoint
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: Principal,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = DirectoryError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| DirectoryError::NotAuthenticated("Missing authorization header".to_string()))?;

        let token_data = verify_jwt_token(&token, &state.config.authentication.jwt_secret)?;
        let subject = token_data.claims.sub;
        if subject.is_empty() {
            return Err(DirectoryError::NotAuthenticated(
                "Invalid JWT: empty 'sub' claim".to_string(),
            ));
        }

        tracing::debug!(principal_id = %subject, "Authenticated request");

        let principal = Principal::new(subject).with_request_context(
            extract_client_ip(&parts.headers),
            extract_user_agent(&parts.headers),
        );

        Ok(AuthContext { principal })
    }
}

/// Verify a JWT token with full validation
///
/// This performs:
/// 1. JWT signature verification
/// 2. Expiration checking
/// 3. Claims validation
pub fn verify_jwt_token(
    token: &str,
    jwt_secret: &str,
) -> Result<jsonwebtoken::TokenData<Claims>, DirectoryError> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (5 minutes)
    validation.leeway = 300;

    decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                DirectoryError::NotAuthenticated("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                DirectoryError::NotAuthenticated("Invalid token signature".to_string())
            }
            _ => DirectoryError::NotAuthenticated(format!("Invalid token: {}", e)),
        }
    })
}

/// Issue an access token for `subject`, valid for `ttl`
pub fn issue_token(
    subject: &str,
    jwt_secret: &str,
    ttl: chrono::Duration,
) -> Result<String, DirectoryError> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        exp: (now + ttl).timestamp(),
        iat: Some(now.timestamp()),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| DirectoryError::Internal(format!("Failed to sign token: {}", e)))
}
