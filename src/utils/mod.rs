use axum::{Json, extract::FromRequest, http::StatusCode};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, ValidationErrors};

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: i64,
    pub iat: i64,
    pub is_staff: bool,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub.parse().map_err(|_| AppError::Unauthorized)
    }
}

pub fn generate_token(
    user_id: i64,
    is_staff: bool,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = (now + Duration::seconds(config.jwt_expiration().as_secs() as i64)).timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
        iat: now.timestamp(),
        is_staff,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none", skip_deserializing)]
    pub errors: Option<ValidationErrors>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
        errors: None,
    })
}

pub type HandlerResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;

pub fn ok<T: Serialize>(data: T) -> HandlerResult<T> {
    Ok((StatusCode::OK, success_to_api_response(data)))
}

pub fn created<T: Serialize>(data: T) -> HandlerResult<T> {
    Ok((StatusCode::CREATED, success_to_api_response(data)))
}

/// `Json` whose rejections come back as 400 validation errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const CONFLICT: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/qboard_test".into(),
        redis_url: "redis://127.0.0.1/".into(),
        jwt_secret: "test-secret".into(),
        jwt_expiration_secs: 3600,
        rate_limit_window_secs: 60,
        rate_limit_requests: 100,
        server_host: "127.0.0.1".into(),
        server_port: 3000,
        api_base_uri: "/api".into(),
        media_root: "media".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hashed = hash_password("testpass123").unwrap();
        assert!(verify_password("testpass123", &hashed).unwrap());
        assert!(!verify_password("badpass", &hashed).unwrap());
    }

    #[test]
    fn token_carries_user_and_staff_flag() {
        let config = test_config();
        let (token, exp) = generate_token(42, true, &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();

        assert_eq!(claims.user_id().unwrap(), 42);
        assert!(claims.is_staff);
        assert_eq!(claims.exp, exp);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let config = test_config();
        let (token, _) = generate_token(1, false, &config).unwrap();

        let mut other = test_config();
        other.jwt_secret = "another-secret".into();
        assert!(verify_token(&token, &other).is_err());
    }
}
