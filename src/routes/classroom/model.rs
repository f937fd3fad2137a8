use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, ValidationErrors},
    routes::user::model::Institution,
};

/// Semester label, always stored trimmed and word-capitalized:
/// `" summer "` becomes `"Summer"`, `"fall term"` becomes `"FallTerm"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Semester(String);

impl Semester {
    pub fn new(raw: &str) -> Self {
        Semester(
            raw.split_whitespace()
                .map(capitalize)
                .collect::<String>(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

impl From<String> for Semester {
    fn from(value: String) -> Self {
        Semester::new(&value)
    }
}

impl From<Semester> for String {
    fn from(value: Semester) -> Self {
        value.0
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Classroom {
    pub class_id: Uuid,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub institution: Institution,
    pub course_id: String,
    pub course_name: String,
    pub section: i32,
    #[sqlx(try_from = "String")]
    pub semester: Semester,
    pub year: i32,
    pub description: String,
}

impl fmt::Display for Classroom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.course_id, self.section, self.semester, self.year, self.institution
        )
    }
}

const CLASSROOM_COLUMNS: &str =
    "class_id, user_id, institution, course_id, course_name, section, semester, year, description";

/// List shape.
#[derive(Debug, Serialize)]
pub struct ClassroomSummary {
    pub class_id: Uuid,
    pub institution: Institution,
    pub course_id: String,
    pub section: i32,
    pub semester: Semester,
    pub year: i32,
}

impl From<Classroom> for ClassroomSummary {
    fn from(c: Classroom) -> Self {
        Self {
            class_id: c.class_id,
            institution: c.institution,
            course_id: c.course_id,
            section: c.section,
            semester: c.semester,
            year: c.year,
        }
    }
}

/// Detail shape.
#[derive(Debug, Serialize)]
pub struct ClassroomDetail {
    pub class_id: Uuid,
    pub institution: Institution,
    pub institution_name: &'static str,
    pub course_id: String,
    pub course_name: String,
    pub section: i32,
    pub semester: Semester,
    pub year: i32,
    pub description: String,
    pub display: String,
}

impl From<Classroom> for ClassroomDetail {
    fn from(c: Classroom) -> Self {
        let display = c.to_string();
        Self {
            class_id: c.class_id,
            institution: c.institution,
            institution_name: c.institution.full_name(),
            course_id: c.course_id,
            course_name: c.course_name,
            section: c.section,
            semester: c.semester,
            year: c.year,
            description: c.description,
            display,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ClassroomRequest {
    pub institution: Option<String>,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub section: Option<i64>,
    pub semester: Option<String>,
    pub year: Option<i64>,
    pub description: Option<String>,
}

/// Validated classroom fields. `None` leaves a column untouched on update.
#[derive(Debug, Default, Clone)]
pub struct ClassroomFields {
    pub institution: Option<Institution>,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub section: Option<i32>,
    pub semester: Option<Semester>,
    pub year: Option<i32>,
    pub description: Option<String>,
}

impl ClassroomRequest {
    /// `partial` is PATCH semantics; otherwise the required fields must be present.
    pub fn validate(self, partial: bool) -> Result<ClassroomFields, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let required = |errors: &mut ValidationErrors, field: &str, present: bool| {
            if !partial && !present {
                errors.add(field, "This field is required.");
            }
        };

        required(&mut errors, "institution", self.institution.is_some());
        let institution = match self.institution.as_deref() {
            Some(raw) => Institution::parse_field(Some(raw), "institution", &mut errors),
            None => None,
        };

        required(&mut errors, "course_id", self.course_id.is_some());
        let course_id = self.course_id.map(|c| c.trim().to_string());
        if course_id.as_deref() == Some("") {
            errors.add("course_id", "This field may not be blank.");
        }

        required(&mut errors, "section", self.section.is_some());
        let section = match self.section {
            Some(s) if (1..=i64::from(i32::MAX)).contains(&s) => Some(s as i32),
            Some(_) => {
                errors.add("section", "Ensure this value is greater than or equal to 1.");
                None
            }
            None => None,
        };

        required(&mut errors, "semester", self.semester.is_some());
        let semester = self.semester.as_deref().map(Semester::new);
        if semester.as_ref().is_some_and(Semester::is_empty) {
            errors.add("semester", "This field may not be blank.");
        }

        required(&mut errors, "year", self.year.is_some());
        let year = match self.year {
            Some(y) if (1900..=9999).contains(&y) => Some(y as i32),
            Some(_) => {
                errors.add("year", "Enter a valid year.");
                None
            }
            None => None,
        };

        errors.finish(ClassroomFields {
            institution,
            course_id,
            course_name: self.course_name.map(|c| c.trim().to_string()),
            section,
            semester,
            year,
            description: self.description,
        })
    }
}

/// A classroom member with their classroom-scoped standing.
#[derive(Debug, Serialize, FromRow)]
pub struct Member {
    pub user_id: i64,
    pub disp_name: String,
    pub std_id: i32,
    pub is_faculty: bool,
    pub score: i32,
    pub coins: i32,
    pub rank: String,
}

impl Classroom {
    /// Creates the classroom and enrolls its owner, with a stats row.
    pub async fn create(
        pool: &PgPool,
        owner_id: i64,
        fields: ClassroomFields,
    ) -> Result<Self, AppError> {
        let (Some(institution), Some(course_id), Some(section), Some(semester), Some(year)) = (
            fields.institution,
            fields.course_id,
            fields.section,
            fields.semester,
            fields.year,
        ) else {
            return Err(AppError::non_field("Missing required classroom fields."));
        };

        let mut tx = pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO classrooms (class_id, user_id, institution, course_id, course_name,
                                    section, semester, year, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CLASSROOM_COLUMNS}
            "#
        );
        let classroom = sqlx::query_as::<_, Classroom>(&sql)
            .bind(Uuid::new_v4())
            .bind(owner_id)
            .bind(institution.as_str())
            .bind(course_id)
            .bind(fields.course_name.unwrap_or_default())
            .bind(section)
            .bind(semester.as_str())
            .bind(year)
            .bind(fields.description.unwrap_or_default())
            .fetch_one(&mut *tx)
            .await?;

        enroll(&mut tx, owner_id, classroom.class_id).await?;
        tx.commit().await?;

        tracing::info!("User {} created classroom {}", owner_id, classroom);
        Ok(classroom)
    }

    pub async fn list_for_owner(pool: &PgPool, owner_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {CLASSROOM_COLUMNS} FROM classrooms WHERE user_id = $1 ORDER BY class_id DESC"
        );
        sqlx::query_as::<_, Classroom>(&sql)
            .bind(owner_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find(pool: &PgPool, class_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {CLASSROOM_COLUMNS} FROM classrooms WHERE class_id = $1");
        sqlx::query_as::<_, Classroom>(&sql)
            .bind(class_id)
            .fetch_optional(pool)
            .await
    }

    /// Owner-scoped lookup; other users' classrooms read as missing.
    pub async fn find_owned(
        pool: &PgPool,
        class_id: Uuid,
        owner_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {CLASSROOM_COLUMNS} FROM classrooms WHERE class_id = $1 AND user_id = $2"
        );
        sqlx::query_as::<_, Classroom>(&sql)
            .bind(class_id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update_owned(
        pool: &PgPool,
        class_id: Uuid,
        owner_id: i64,
        fields: ClassroomFields,
    ) -> Result<Self, AppError> {
        let sql = format!(
            r#"
            UPDATE classrooms SET
                institution = COALESCE($3, institution),
                course_id = COALESCE($4, course_id),
                course_name = COALESCE($5, course_name),
                section = COALESCE($6, section),
                semester = COALESCE($7, semester),
                year = COALESCE($8, year),
                description = COALESCE($9, description)
            WHERE class_id = $1 AND user_id = $2
            RETURNING {CLASSROOM_COLUMNS}
            "#
        );
        let classroom = sqlx::query_as::<_, Classroom>(&sql)
            .bind(class_id)
            .bind(owner_id)
            .bind(fields.institution.map(|i| i.as_str()))
            .bind(fields.course_id)
            .bind(fields.course_name)
            .bind(fields.section)
            .bind(fields.semester.map(String::from))
            .bind(fields.year)
            .bind(fields.description)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(classroom)
    }

    pub async fn delete_owned(pool: &PgPool, class_id: Uuid, owner_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM classrooms WHERE class_id = $1 AND user_id = $2")
            .bind(class_id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        tracing::info!("User {} deleted classroom {}", owner_id, class_id);
        Ok(())
    }

    pub async fn enrolled_for(pool: &PgPool, user_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Classroom>(
            r#"
            SELECT c.class_id, c.user_id, c.institution, c.course_id, c.course_name,
                   c.section, c.semester, c.year, c.description
            FROM classrooms c
            JOIN classroom_members m ON m.class_id = c.class_id
            WHERE m.user_id = $1
            ORDER BY m.joined_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Owner or enrolled member.
    pub async fn is_participant(
        pool: &PgPool,
        class_id: Uuid,
        user_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM classrooms WHERE class_id = $1 AND user_id = $2)
                OR EXISTS(SELECT 1 FROM classroom_members WHERE class_id = $1 AND user_id = $2)
            "#,
        )
        .bind(class_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn join(pool: &PgPool, class_id: Uuid, user_id: i64) -> Result<(), AppError> {
        if Self::find(pool, class_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        let mut tx = pool.begin().await?;
        enroll(&mut tx, user_id, class_id).await?;
        tx.commit().await?;
        tracing::info!("User {} joined classroom {}", user_id, class_id);
        Ok(())
    }

    /// Drops the membership; the stats row is kept so balances survive a rejoin.
    pub async fn leave(pool: &PgPool, class_id: Uuid, user_id: i64) -> Result<(), AppError> {
        let classroom = Self::find(pool, class_id).await?.ok_or(AppError::NotFound)?;
        if classroom.user_id == user_id {
            return Err(AppError::non_field("The owner cannot leave their own classroom."));
        }
        let result =
            sqlx::query("DELETE FROM classroom_members WHERE class_id = $1 AND user_id = $2")
                .bind(class_id)
                .bind(user_id)
                .execute(pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::non_field("You are not enrolled in this classroom."));
        }
        tracing::info!("User {} left classroom {}", user_id, class_id);
        Ok(())
    }

    pub async fn members(pool: &PgPool, class_id: Uuid) -> Result<Vec<Member>, sqlx::Error> {
        sqlx::query_as::<_, Member>(
            r#"
            SELECT u.id AS user_id, u.disp_name, u.std_id, u.is_faculty,
                   COALESCE(s.score, 0) AS score,
                   COALESCE(s.coins, 0) AS coins,
                   COALESCE(s.rank, 'Novice Questioner') AS rank
            FROM classroom_members m
            JOIN users u ON u.id = m.user_id
            LEFT JOIN user_classroom_stats s
                   ON s.user_id = m.user_id AND s.class_id = m.class_id
            WHERE m.class_id = $1
            ORDER BY u.disp_name
            "#,
        )
        .bind(class_id)
        .fetch_all(pool)
        .await
    }

    pub async fn search(pool: &PgPool, term: Option<&str>) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {CLASSROOM_COLUMNS} FROM classrooms
            WHERE $1::TEXT IS NULL
               OR institution ILIKE '%' || $1 || '%'
               OR class_id::TEXT ILIKE '%' || $1 || '%'
               OR course_id ILIKE '%' || $1 || '%'
            ORDER BY class_id DESC
            "#
        );
        sqlx::query_as::<_, Classroom>(&sql)
            .bind(term)
            .fetch_all(pool)
            .await
    }
}

/// Membership plus the per-classroom stats row, both idempotent.
async fn enroll(conn: &mut PgConnection, user_id: i64, class_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO classroom_members (user_id, class_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, class_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(class_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO user_classroom_stats (user_id, class_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, class_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(class_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classroom(semester: &str) -> Classroom {
        Classroom {
            class_id: Uuid::nil(),
            user_id: 1,
            institution: Institution::Iub,
            course_id: "CSE-101".into(),
            course_name: "Introduction to Programming".into(),
            section: 11,
            semester: Semester::new(semester),
            year: 2023,
            description: String::new(),
        }
    }

    #[test]
    fn semester_is_normalized_on_every_path() {
        assert_eq!(Semester::new("summer").as_str(), "Summer");
        assert_eq!(Semester::new("  SUMMER  ").as_str(), "Summer");
        assert_eq!(Semester::new("fall term").as_str(), "FallTerm");
        assert_eq!(Semester::from(" sPrInG ".to_string()).as_str(), "Spring");

        let parsed: Semester = serde_json::from_str("\"  autumn \"").unwrap();
        assert_eq!(parsed.as_str(), "Autumn");
    }

    #[test]
    fn display_joins_identifying_fields() {
        assert_eq!(classroom(" summer ").to_string(), "CSE-101-11-Summer-2023-IUB");
    }

    #[test]
    fn create_request_normalizes_semester() {
        let fields = ClassroomRequest {
            institution: Some("IUB".into()),
            course_id: Some("CSE-101".into()),
            section: Some(11),
            semester: Some("summer".into()),
            year: Some(2023),
            ..Default::default()
        }
        .validate(false)
        .unwrap();

        assert_eq!(fields.semester.unwrap().as_str(), "Summer");
        assert_eq!(fields.institution, Some(Institution::Iub));
        assert!(fields.course_name.is_none());
    }

    #[test]
    fn full_validation_requires_fields() {
        let errors = ClassroomRequest::default().validate(false).unwrap_err();
        for field in ["institution", "course_id", "section", "semester", "year"] {
            assert!(errors.has(field), "{field} not required");
        }
        assert!(ClassroomRequest::default().validate(true).is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let errors = ClassroomRequest {
            institution: Some("MIT".into()),
            section: Some(0),
            semester: Some("   ".into()),
            year: Some(20),
            ..Default::default()
        }
        .validate(true)
        .unwrap_err();
        for field in ["institution", "section", "semester", "year"] {
            assert!(errors.has(field), "{field} accepted");
        }
    }
}
