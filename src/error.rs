use std::collections::BTreeMap;
use std::fmt;

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{ApiResponse, error_codes};

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field name -> messages, the shape returned with every 400.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn finish<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Stored text that is not one of the known choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidChoice(pub String);

impl fmt::Display for InvalidChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" is not a valid choice.", self.0)
    }
}

impl std::error::Error for InvalidChoice {}

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationErrors),
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict(String),
    Database(sqlx::Error),
    Internal(String),
}

impl AppError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(ValidationErrors::single(field, message))
    }

    pub fn non_field(message: impl Into<String>) -> Self {
        Self::field(NON_FIELD_ERRORS, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(errors) => write!(f, "validation failed: {}", errors),
            AppError::Unauthorized => write!(f, "unauthorized"),
            AppError::Forbidden => write!(f, "forbidden"),
            AppError::NotFound => write!(f, "not found"),
            AppError::Conflict(msg) => write!(f, "conflict: {}", msg),
            AppError::Database(e) => write!(f, "database error: {}", e),
            AppError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::non_field(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::non_field(err.body_text())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("password hashing failed: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("token encoding failed: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("io error: {}", err))
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Constraint name -> (field, message) for rows that lost a race with a
/// concurrent insert after passing the pre-checks.
fn unique_violation(constraint: &str) -> Option<(&'static str, &'static str)> {
    match constraint {
        "users_email_key" => Some(("email", "User with this email already exists.")),
        "users_std_id_institution_key" => Some((
            NON_FIELD_ERRORS,
            "A user with this Student/Faculty ID already exists in the given institution.",
        )),
        "question_votes_user_question_key" => {
            Some((NON_FIELD_ERRORS, "You have already voted on this question."))
        }
        "answer_votes_user_answer_key" => {
            Some((NON_FIELD_ERRORS, "You have already voted on this answer."))
        }
        "unique_report_per_user_per_question" => {
            Some((NON_FIELD_ERRORS, "You have already reported this question."))
        }
        "unique_report_per_user_per_answer" => {
            Some((NON_FIELD_ERRORS, "You have already reported this answer."))
        }
        _ => None,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return AppError::NotFound;
        }

        let mapped = err.as_database_error().and_then(|db| {
            let code = db.code()?;
            let constraint = db.constraint().unwrap_or_default();
            match code.as_ref() {
                UNIQUE_VIOLATION => unique_violation(constraint)
                    .map(|(field, message)| AppError::field(field, message)),
                FOREIGN_KEY_VIOLATION => match constraint {
                    "classrooms_user_id_fkey" | "questions_user_id_fkey" => Some(
                        AppError::Conflict(
                            "User cannot be deleted while it owns classrooms or questions."
                                .to_string(),
                        ),
                    ),
                    _ => Some(AppError::non_field("Referenced object does not exist.")),
                },
                CHECK_VIOLATION if constraint == "reports_single_target" => Some(
                    AppError::non_field("A report must be for either a question or an answer."),
                ),
                _ => None,
            }
        });

        mapped.unwrap_or(AppError::Database(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg, errors) = match self {
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                error_codes::VALIDATION_ERROR,
                "validation failed".to_string(),
                Some(errors),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "Authentication credentials were not provided or are invalid.".to_string(),
                None,
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                error_codes::PERMISSION_DENIED,
                "You do not have permission to perform this action.".to_string(),
                None,
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                "Not found.".to_string(),
                None,
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, error_codes::CONFLICT, msg, None),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "database error".to_string(),
                    None,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        let body = axum::Json(ApiResponse::<()> {
            code,
            msg,
            resp_data: None,
            errors,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_collect_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "This field is required.");
        errors.add("email", "Enter a valid email address.");
        errors.add(NON_FIELD_ERRORS, "nope");

        assert!(errors.has("email"));
        assert_eq!(errors.get("email").map(|m| m.len()), Some(2));
        assert!(errors.clone().finish(()).is_err());
        assert!(ValidationErrors::new().finish(1).is_ok());
    }

    #[test]
    fn known_constraints_become_field_errors() {
        assert_eq!(unique_violation("users_email_key").map(|(f, _)| f), Some("email"));
        assert_eq!(
            unique_violation("unique_report_per_user_per_answer").map(|(f, _)| f),
            Some(NON_FIELD_ERRORS)
        );
        assert!(unique_violation("something_else").is_none());
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::non_field("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(sqlx::Error::RowNotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
