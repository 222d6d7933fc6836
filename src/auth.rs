//! Bearer credential validation and request identity extraction.

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Claims minted by the main application backend at login.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,

    /// Display name shown on room messages
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub role: String,

    /// Departments the subject belongs to; grants the matching
    /// department rooms
    #[serde(default)]
    pub departments: Vec<Uuid>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Stateless credential validator shared by the HTTP extractor, the
/// WebSocket handshake and the in-session periodic re-check.
///
/// Every failure collapses to [`AppError::InvalidCredential`]; the cause
/// (expired, bad signature, malformed) is logged but never returned, so a
/// probing client cannot tell the cases apart.
#[derive(Clone)]
pub struct CredentialValidator {
    secret: String,
    validation: Validation,
}

impl CredentialValidator {
    pub fn new(secret: &str, leeway_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = leeway_seconds;

        Self {
            secret: secret.to_string(),
            validation,
        }
    }

    /// Validate a raw token (without the "Bearer " prefix) and extract claims.
    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let header = decode_header(token).map_err(|e| {
            debug!("credential rejected: undecodable header: {e}");
            AppError::InvalidCredential
        })?;

        if header.alg != self.validation.algorithms[0] {
            debug!("credential rejected: unexpected algorithm {:?}", header.alg);
            return Err(AppError::InvalidCredential);
        }

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &self.validation,
        )
        .map_err(|e| {
            debug!("credential rejected: {e}");
            AppError::InvalidCredential
        })?;

        Ok(token_data.claims)
    }
}

/// Pull the raw token out of an `Authorization: Bearer <token>` header.
pub fn extract_bearer(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get(actix_web::http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Authenticated identity extracted from the request's bearer credential.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub departments: Vec<Uuid>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            id: claims.sub,
            name: claims.name,
            role: claims.role,
            departments: claims.departments,
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = (|| {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or(AppError::Internal)?;
            let token = extract_bearer(req).ok_or(AppError::InvalidCredential)?;
            let claims = state.validator.validate(&token)?;
            Ok(AuthUser::from(claims))
        })();

        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_token(secret: &str, sub: Uuid, exp_offset: i64, departments: Vec<Uuid>) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub,
            name: "Test User".to_string(),
            role: "member".to_string(),
            departments,
            iat: now,
            exp: now + exp_offset,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_token() {
        let validator = CredentialValidator::new("test-secret-key", 0);
        let subject = Uuid::new_v4();
        let dept = Uuid::new_v4();

        let token = create_test_token("test-secret-key", subject, 3600, vec![dept]);
        let claims = validator.validate(&token).unwrap();

        assert_eq!(claims.sub, subject);
        assert_eq!(claims.name, "Test User");
        assert_eq!(claims.departments, vec![dept]);
    }

    #[test]
    fn test_all_failures_are_indistinguishable() {
        let validator = CredentialValidator::new("secret1", 0);
        let subject = Uuid::new_v4();

        // Expired 100 seconds ago
        let expired = create_test_token("secret1", subject, -100, vec![]);
        // Signed with a different key
        let forged = create_test_token("secret2", subject, 3600, vec![]);
        // Not a token at all
        let garbage = "not.a.token";

        for token in [expired.as_str(), forged.as_str(), garbage] {
            let err = validator.validate(token).unwrap_err();
            assert!(matches!(err, AppError::InvalidCredential));
            assert_eq!(err.to_string(), "invalid credential");
        }
    }

    #[test]
    fn test_validate_rejects_wrong_algorithm() {
        let validator = CredentialValidator::new("test-secret-key", 0);
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            name: String::new(),
            role: String::new(),
            departments: vec![],
            iat: now,
            exp: now + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"test-secret-key"),
        )
        .unwrap();

        let result = validator.validate(&token);
        assert!(matches!(result, Err(AppError::InvalidCredential)));
    }

    #[test]
    fn test_leeway_tolerates_recent_expiry() {
        let validator = CredentialValidator::new("test-secret-key", 60);

        // Expired 10 seconds ago, inside the 60 second leeway window
        let token = create_test_token("test-secret-key", Uuid::new_v4(), -10, vec![]);
        assert!(validator.validate(&token).is_ok());
    }

    #[test]
    fn test_extract_bearer() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer some-token"))
            .to_http_request();
        assert_eq!(extract_bearer(&req), Some("some-token".to_string()));
    }

    #[test]
    fn test_extract_bearer_rejects_other_schemes() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(extract_bearer(&req), None);

        let empty = TestRequest::default()
            .insert_header(("Authorization", "Bearer "))
            .to_http_request();
        assert_eq!(extract_bearer(&empty), None);

        let missing = TestRequest::default().to_http_request();
        assert_eq!(extract_bearer(&missing), None);
    }
}
