use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::{
    error::{AppError, InvalidChoice, ValidationErrors},
    rank::Rank,
    utils::{hash_password, verify_password},
};

pub const MIN_PASSWORD_LEN: usize = 5;
pub const MIN_DISP_NAME_LEN: usize = 3;
pub const STD_ID_RANGE: std::ops::RangeInclusive<i32> = 1000..=9_999_999;
pub const PICTURE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

const REQUIRED: &str = "This field is required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Institution {
    #[serde(rename = "IUB")]
    Iub,
    #[serde(rename = "DU")]
    Du,
}

impl Institution {
    pub const ALL: [Institution; 2] = [Institution::Iub, Institution::Du];

    pub fn as_str(&self) -> &'static str {
        match self {
            Institution::Iub => "IUB",
            Institution::Du => "DU",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            Institution::Iub => "Independent University, Bangladesh (IUB)",
            Institution::Du => "University of Dhaka (DU)",
        }
    }

    /// Field-level parse used by request validation.
    pub fn parse_field(raw: Option<&str>, field: &str, errors: &mut ValidationErrors) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") => {
                errors.add(field, REQUIRED);
                None
            }
            Some(value) => match value.parse() {
                Ok(institution) => Some(institution),
                Err(e) => {
                    errors.add(field, InvalidChoice::to_string(&e));
                    None
                }
            },
        }
    }
}

impl FromStr for Institution {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Institution::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| InvalidChoice(s.to_string()))
    }
}

impl TryFrom<String> for Institution {
    type Error = InvalidChoice;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Institution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub std_id: i32,
    pub disp_name: String,
    #[sqlx(try_from = "String")]
    pub institution: Institution,
    pub picture: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_faculty: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub q_score: i32,
    pub q_coins: i32,
    pub rank: String,
    pub questions_asked: i32,
    pub basic_asked: i32,
    pub fundamental_asked: i32,
    pub practical_asked: i32,
    pub analytical_asked: i32,
    pub inventive_asked: i32,
    pub critical_asked: i32,
    pub questions_answered: i32,
    pub basic_answered: i32,
    pub fundamental_answered: i32,
    pub practical_answered: i32,
    pub analytical_answered: i32,
    pub inventive_answered: i32,
    pub critical_answered: i32,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.disp_name, self.std_id)
    }
}

pub(crate) const USER_COLUMNS: &str = r#"
    id, email, password_hash, std_id, disp_name, institution, picture,
    is_active, is_staff, is_superuser, is_faculty, date_joined, last_login,
    q_score, q_coins, rank,
    questions_asked, basic_asked, fundamental_asked, practical_asked,
    analytical_asked, inventive_asked, critical_asked,
    questions_answered, basic_answered, fundamental_answered, practical_answered,
    analytical_answered, inventive_answered, critical_answered
"#;

/// A fully validated account, ready to insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub std_id: i32,
    pub disp_name: String,
    pub institution: Institution,
    pub is_faculty: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub std_id: Option<i64>,
    pub disp_name: Option<String>,
    pub institution: Option<String>,
    #[serde(default)]
    pub is_faculty: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub password: Option<String>,
    pub std_id: Option<i64>,
    pub disp_name: Option<String>,
    pub institution: Option<String>,
}

#[derive(Debug, Default)]
pub struct UserChanges {
    pub password: Option<String>,
    pub std_id: Option<i32>,
    pub disp_name: Option<String>,
    pub institution: Option<Institution>,
}

#[derive(Debug, Deserialize)]
pub struct AuthTokenRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthTokenResponse {
    pub token: String,
    pub expires_at: i64,
}

/// Public shape of an account; never carries the password hash.
#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: i64,
    pub email: String,
    pub std_id: i32,
    pub disp_name: String,
    pub institution: Institution,
    pub picture: Option<String>,
    pub is_faculty: bool,
    pub date_joined: DateTime<Utc>,
    pub q_score: i32,
    pub q_coins: i32,
    pub rank: String,
    pub questions_asked: i32,
    pub questions_answered: i32,
    pub asked_by_level: LevelCounters,
    pub answered_by_level: LevelCounters,
}

#[derive(Debug, Serialize)]
pub struct LevelCounters {
    pub basic: i32,
    pub fundamental: i32,
    pub practical: i32,
    pub analytical: i32,
    pub inventive: i32,
    pub critical: i32,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            std_id: user.std_id,
            disp_name: user.disp_name,
            institution: user.institution,
            picture: user.picture,
            is_faculty: user.is_faculty,
            date_joined: user.date_joined,
            q_score: user.q_score,
            q_coins: user.q_coins,
            rank: user.rank,
            questions_asked: user.questions_asked,
            questions_answered: user.questions_answered,
            asked_by_level: LevelCounters {
                basic: user.basic_asked,
                fundamental: user.fundamental_asked,
                practical: user.practical_asked,
                analytical: user.analytical_asked,
                inventive: user.inventive_asked,
                critical: user.critical_asked,
            },
            answered_by_level: LevelCounters {
                basic: user.basic_answered,
                fundamental: user.fundamental_answered,
                practical: user.practical_answered,
                analytical: user.analytical_answered,
                inventive: user.inventive_answered,
                critical: user.critical_answered,
            },
        }
    }
}

/// Lowercases the domain part, leaving the local part untouched.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

fn is_valid_email(email: &str) -> bool {
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn check_password(password: &str, errors: &mut ValidationErrors) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Ensure this field has at least {} characters.", MIN_PASSWORD_LEN),
        );
    }
}

fn check_disp_name(disp_name: &str, errors: &mut ValidationErrors) {
    if disp_name.trim().is_empty() {
        errors.add("disp_name", "This field may not be blank.");
    } else if disp_name.trim().chars().count() < MIN_DISP_NAME_LEN {
        errors.add(
            "disp_name",
            format!("Ensure this field has at least {} characters.", MIN_DISP_NAME_LEN),
        );
    }
}

fn check_std_id(std_id: i64, errors: &mut ValidationErrors) -> Option<i32> {
    match i32::try_from(std_id) {
        Ok(id) if STD_ID_RANGE.contains(&id) => Some(id),
        _ => {
            errors.add("std_id", "Student/Faculty ID must be between 4 and 7 digits.");
            None
        }
    }
}

impl CreateUserRequest {
    pub fn validate(self) -> Result<NewUser, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let email = match self.email.as_deref().map(normalize_email) {
            Some(email) if is_valid_email(&email) => Some(email),
            Some(email) if email.is_empty() => {
                errors.add("email", REQUIRED);
                None
            }
            Some(_) => {
                errors.add("email", "Enter a valid email address.");
                None
            }
            None => {
                errors.add("email", REQUIRED);
                None
            }
        };

        match self.password.as_deref() {
            Some(password) => check_password(password, &mut errors),
            None => errors.add("password", REQUIRED),
        }

        match self.disp_name.as_deref() {
            Some(disp_name) => check_disp_name(disp_name, &mut errors),
            None => errors.add("disp_name", REQUIRED),
        }

        let std_id = match self.std_id {
            Some(std_id) => check_std_id(std_id, &mut errors),
            None => {
                errors.add("std_id", REQUIRED);
                None
            }
        };

        let institution =
            Institution::parse_field(self.institution.as_deref(), "institution", &mut errors);

        match (email, self.password, std_id, self.disp_name, institution) {
            (Some(email), Some(password), Some(std_id), Some(disp_name), Some(institution))
                if errors.is_empty() =>
            {
                Ok(NewUser {
                    email,
                    password,
                    std_id,
                    disp_name: disp_name.trim().to_string(),
                    institution,
                    is_faculty: self.is_faculty,
                    is_staff: false,
                    is_superuser: false,
                })
            }
            _ => Err(errors),
        }
    }
}

impl UpdateUserRequest {
    pub fn validate(self) -> Result<UserChanges, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(password) = self.password.as_deref() {
            check_password(password, &mut errors);
        }
        if let Some(disp_name) = self.disp_name.as_deref() {
            check_disp_name(disp_name, &mut errors);
        }
        let std_id = self.std_id.and_then(|id| check_std_id(id, &mut errors));
        let institution = match self.institution.as_deref() {
            Some(raw) => Institution::parse_field(Some(raw), "institution", &mut errors),
            None => None,
        };

        errors.finish(UserChanges {
            password: self.password,
            std_id,
            disp_name: self.disp_name.map(|d| d.trim().to_string()),
            institution,
        })
    }
}

pub fn picture_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    PICTURE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

impl User {
    pub async fn create(pool: &PgPool, new_user: NewUser) -> Result<Self, AppError> {
        let password_hash = hash_password(&new_user.password)?;

        let sql = format!(
            r#"
            INSERT INTO users (email, password_hash, std_id, disp_name, institution,
                               is_faculty, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.email)
            .bind(password_hash)
            .bind(new_user.std_id)
            .bind(&new_user.disp_name)
            .bind(new_user.institution.as_str())
            .bind(new_user.is_faculty)
            .bind(new_user.is_staff)
            .bind(new_user.is_superuser)
            .fetch_one(pool)
            .await?;

        tracing::info!("Created user {} ({})", user.id, user.email);
        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn email_taken(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(pool)
            .await
    }

    /// Whether another account already holds this (std_id, institution).
    pub async fn std_id_taken(
        pool: &PgPool,
        std_id: i32,
        institution: Institution,
        except_user: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE std_id = $1 AND institution = $2 AND ($3::BIGINT IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(std_id)
        .bind(institution.as_str())
        .bind(except_user)
        .fetch_one(pool)
        .await
    }

    /// Email/password check; inactive accounts never authenticate.
    pub async fn authenticate(
        pool: &PgPool,
        email: &str,
        password: &str,
    ) -> Result<Option<Self>, AppError> {
        if email.is_empty() || password.is_empty() {
            return Ok(None);
        }
        let Some(user) = Self::find_by_email(pool, &normalize_email(email)).await? else {
            return Ok(None);
        };
        if !user.is_active || !verify_password(password, &user.password_hash)? {
            return Ok(None);
        }

        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(pool)
            .await?;

        Ok(Some(user))
    }

    pub async fn update(pool: &PgPool, id: i64, changes: UserChanges) -> Result<Self, AppError> {
        let password_hash = changes
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?;

        let sql = format!(
            r#"
            UPDATE users SET
                password_hash = COALESCE($2, password_hash),
                std_id = COALESCE($3, std_id),
                disp_name = COALESCE($4, disp_name),
                institution = COALESCE($5, institution)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(password_hash)
            .bind(changes.std_id)
            .bind(changes.disp_name)
            .bind(changes.institution.map(|i| i.as_str()))
            .fetch_one(pool)
            .await?;

        Ok(user)
    }

    pub async fn set_picture(pool: &PgPool, id: i64, path: &str) -> Result<Self, AppError> {
        let sql = format!("UPDATE users SET picture = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(path)
            .fetch_one(pool)
            .await?;
        Ok(user)
    }

    /// Fails with a conflict while the user still owns classrooms or questions.
    pub async fn delete(pool: &PgPool, id: i64) -> Result<(), AppError> {
        let owns: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM classrooms WHERE user_id = $1)
                OR EXISTS(SELECT 1 FROM questions WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        if owns {
            return Err(AppError::Conflict(
                "User cannot be deleted while it owns classrooms or questions.".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    /// Operator edit of account flags and balances; rank follows the score.
    pub async fn admin_update(
        pool: &PgPool,
        id: i64,
        changes: AdminUserChanges,
    ) -> Result<Self, AppError> {
        let rank = changes.q_score.map(|score| Rank::for_score(score).label());
        let sql = format!(
            r#"
            UPDATE users SET
                is_active = COALESCE($2, is_active),
                is_staff = COALESCE($3, is_staff),
                is_faculty = COALESCE($4, is_faculty),
                q_score = COALESCE($5, q_score),
                q_coins = COALESCE($6, q_coins),
                rank = COALESCE($7, rank)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.is_active)
            .bind(changes.is_staff)
            .bind(changes.is_faculty)
            .bind(changes.q_score)
            .bind(changes.q_coins)
            .bind(rank)
            .fetch_one(pool)
            .await?;

        tracing::info!("Operator updated user {}", id);
        Ok(user)
    }

    pub async fn search(pool: &PgPool, term: Option<&str>) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE $1::TEXT IS NULL
               OR email ILIKE '%' || $1 || '%'
               OR disp_name ILIKE '%' || $1 || '%'
            ORDER BY id
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(term)
            .fetch_all(pool)
            .await
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminUserChanges {
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_faculty: Option<bool>,
    pub q_score: Option<i32>,
    pub q_coins: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateUserRequest {
        CreateUserRequest {
            email: Some("test@Example.COM".into()),
            password: Some("testpass123".into()),
            std_id: Some(2021065),
            disp_name: Some("Test User".into()),
            institution: Some("IUB".into()),
            is_faculty: false,
        }
    }

    #[test]
    fn valid_request_normalizes_email() {
        let user = request().validate().unwrap();
        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.institution, Institution::Iub);
        assert_eq!(user.std_id, 2021065);
    }

    #[test]
    fn missing_std_id_is_rejected() {
        let errors = CreateUserRequest {
            std_id: None,
            ..request()
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.get("std_id"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn std_id_must_have_four_to_seven_digits() {
        for bad in [999, 10_000_000, -1, i64::MAX] {
            let errors = CreateUserRequest {
                std_id: Some(bad),
                ..request()
            }
            .validate()
            .unwrap_err();
            assert!(errors.has("std_id"), "{bad} accepted");
        }
        for good in [1000, 9_999_999] {
            assert!(CreateUserRequest { std_id: Some(good), ..request() }.validate().is_ok());
        }
    }

    #[test]
    fn short_password_and_display_name() {
        let errors = CreateUserRequest {
            password: Some("pw".into()),
            disp_name: Some("dn".into()),
            ..request()
        }
        .validate()
        .unwrap_err();
        assert!(errors.has("password"));
        assert!(errors.has("disp_name"));
    }

    #[test]
    fn blank_display_name() {
        let errors = CreateUserRequest {
            disp_name: Some("".into()),
            ..request()
        }
        .validate()
        .unwrap_err();
        assert!(errors.has("disp_name"));
    }

    #[test]
    fn institution_must_be_a_choice() {
        for bad in ["", "IBA", "iub"] {
            let errors = CreateUserRequest {
                institution: Some(bad.into()),
                ..request()
            }
            .validate()
            .unwrap_err();
            assert!(errors.has("institution"), "{bad:?} accepted");
        }
        let user = CreateUserRequest {
            institution: Some("DU".into()),
            ..request()
        }
        .validate()
        .unwrap();
        assert_eq!(user.institution, Institution::Du);
    }

    #[test]
    fn invalid_email() {
        for bad in ["", "plainaddress", "@example.com", "a@b", "a b@example.com"] {
            let errors = CreateUserRequest {
                email: Some(bad.into()),
                ..request()
            }
            .validate()
            .unwrap_err();
            assert!(errors.has("email"), "{bad:?} accepted");
        }
    }

    #[test]
    fn partial_update_validates_only_given_fields() {
        let changes = UpdateUserRequest {
            disp_name: Some("Updated Display Name".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(changes.disp_name.as_deref(), Some("Updated Display Name"));
        assert!(changes.institution.is_none());

        let errors = UpdateUserRequest {
            institution: Some("JU".into()),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(errors.has("institution"));
    }

    #[test]
    fn picture_extensions() {
        assert_eq!(picture_extension("me.JPG").as_deref(), Some("jpg"));
        assert_eq!(picture_extension("me.png").as_deref(), Some("png"));
        assert!(picture_extension("me.bmp").is_none());
        assert!(picture_extension("noext").is_none());
    }

    #[test]
    fn institution_round_trips_through_text() {
        for institution in Institution::ALL {
            assert_eq!(
                Institution::try_from(institution.as_str().to_string()).unwrap(),
                institution
            );
        }
        assert!(Institution::try_from("IBA".to_string()).is_err());
    }
}
