use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, InvalidChoice, ValidationErrors},
    routes::classroom::model::Classroom,
};

pub const MAX_CONTENT_LEN: usize = 255;

/// Cognitive level of a question, from recall up to critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Basic,
    Fundamental,
    Practical,
    Analytical,
    Inventive,
    Critical,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Basic,
        Level::Fundamental,
        Level::Practical,
        Level::Analytical,
        Level::Inventive,
        Level::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Basic => "Basic",
            Level::Fundamental => "Fundamental",
            Level::Practical => "Practical",
            Level::Analytical => "Analytical",
            Level::Inventive => "Inventive",
            Level::Critical => "Critical",
        }
    }

    /// Prefix of the per-level counter columns on `users`.
    pub fn counter_prefix(&self) -> &'static str {
        match self {
            Level::Basic => "basic",
            Level::Fundamental => "fundamental",
            Level::Practical => "practical",
            Level::Analytical => "analytical",
            Level::Inventive => "inventive",
            Level::Critical => "critical",
        }
    }

    pub fn flags(&self) -> LevelFlags {
        LevelFlags {
            is_basic: *self == Level::Basic,
            is_fundamental: *self == Level::Fundamental,
            is_practical: *self == Level::Practical,
            is_analytical: *self == Level::Analytical,
            is_inventive: *self == Level::Inventive,
            is_critical: *self == Level::Critical,
        }
    }
}

impl FromStr for Level {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| InvalidChoice(s.to_string()))
    }
}

impl TryFrom<String> for Level {
    type Error = InvalidChoice;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct LevelFlags {
    pub is_basic: bool,
    pub is_fundamental: bool,
    pub is_practical: bool,
    pub is_analytical: bool,
    pub is_inventive: bool,
    pub is_critical: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct Question {
    pub id: i64,
    pub original_question_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    pub class_id: Uuid,
    pub content: String,
    pub topic: String,
    pub score: i32,
    #[sqlx(try_from = "String")]
    pub level: Level,
    #[sqlx(flatten)]
    pub flags: LevelFlags,
    pub is_answered: bool,
    pub is_anonymous: bool,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

const QUESTION_COLUMNS: &str = r#"
    id, original_question_id, timestamp, user_id, class_id, content, topic, score, level,
    is_basic, is_fundamental, is_practical, is_analytical, is_inventive, is_critical,
    is_answered, is_anonymous
"#;

/// A question as seen by `viewer`: anonymous authors are hidden from others.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: i64,
    pub original_question_id: Option<i64>,
    pub is_counter_question: bool,
    pub timestamp: DateTime<Utc>,
    pub author_id: Option<i64>,
    pub class_id: Uuid,
    pub content: String,
    pub topic: String,
    pub score: i32,
    pub level: Level,
    #[serde(flatten)]
    pub flags: LevelFlags,
    pub is_answered: bool,
    pub is_anonymous: bool,
}

impl QuestionView {
    pub fn for_viewer(question: Question, viewer_id: i64) -> Self {
        let hide_author = question.is_anonymous && question.user_id != viewer_id;
        Self::build(question, hide_author)
    }

    /// Operator view; the author is always shown.
    pub fn unmasked(question: Question) -> Self {
        Self::build(question, false)
    }

    fn build(question: Question, hide_author: bool) -> Self {
        Self {
            id: question.id,
            original_question_id: question.original_question_id,
            is_counter_question: question.original_question_id.is_some(),
            timestamp: question.timestamp,
            author_id: (!hide_author).then_some(question.user_id),
            class_id: question.class_id,
            content: question.content,
            topic: question.topic,
            score: question.score,
            level: question.level,
            flags: question.flags,
            is_answered: question.is_answered,
            is_anonymous: question.is_anonymous,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateQuestionRequest {
    pub classroom: Option<Uuid>,
    pub content: Option<String>,
    pub topic: Option<String>,
    pub level: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub original_question: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub class_id: Uuid,
    pub content: String,
    pub topic: String,
    pub level: Level,
    pub is_anonymous: bool,
    pub original_question_id: Option<i64>,
}

/// Level and classroom are fixed once asked; only the wording can change.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuestionRequest {
    pub content: Option<String>,
    pub topic: Option<String>,
    pub is_anonymous: Option<bool>,
}

pub(crate) fn check_text(
    field: &str,
    value: Option<&str>,
    max_len: Option<usize>,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let value = value.map(str::trim)?;
    if value.is_empty() {
        errors.add(field, "This field may not be blank.");
        return None;
    }
    if let Some(max) = max_len {
        if value.chars().count() > max {
            errors.add(
                field,
                format!("Ensure this field has no more than {} characters.", max),
            );
            return None;
        }
    }
    Some(value.to_string())
}

impl CreateQuestionRequest {
    pub fn validate(self) -> Result<NewQuestion, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.classroom.is_none() {
            errors.add("classroom", "This field is required.");
        }
        for (field, value) in [("content", &self.content), ("topic", &self.topic)] {
            if value.is_none() {
                errors.add(field, "This field is required.");
            }
        }
        let content = check_text("content", self.content.as_deref(), Some(MAX_CONTENT_LEN), &mut errors);
        let topic = check_text("topic", self.topic.as_deref(), Some(MAX_CONTENT_LEN), &mut errors);

        let level = match self.level.as_deref() {
            None => {
                errors.add("level", "This field is required.");
                None
            }
            Some(raw) => match raw.trim().parse::<Level>() {
                Ok(level) => Some(level),
                Err(e) => {
                    errors.add("level", e.to_string());
                    None
                }
            },
        };

        match (self.classroom, content, topic, level) {
            (Some(class_id), Some(content), Some(topic), Some(level)) if errors.is_empty() => {
                Ok(NewQuestion {
                    class_id,
                    content,
                    topic,
                    level,
                    is_anonymous: self.is_anonymous,
                    original_question_id: self.original_question,
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default)]
pub struct QuestionChanges {
    pub content: Option<String>,
    pub topic: Option<String>,
    pub is_anonymous: Option<bool>,
}

impl UpdateQuestionRequest {
    pub fn validate(self) -> Result<QuestionChanges, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let content = check_text("content", self.content.as_deref(), Some(MAX_CONTENT_LEN), &mut errors);
        let topic = check_text("topic", self.topic.as_deref(), Some(MAX_CONTENT_LEN), &mut errors);
        errors.finish(QuestionChanges {
            content,
            topic,
            is_anonymous: self.is_anonymous,
        })
    }
}

impl Question {
    /// Inserts the question and bumps the author's asked counters in one
    /// transaction. The author must take part in the classroom.
    pub async fn create(pool: &PgPool, user_id: i64, new: NewQuestion) -> Result<Self, AppError> {
        if !Classroom::is_participant(pool, new.class_id, user_id).await? {
            return Err(AppError::NotFound);
        }

        if let Some(original_id) = new.original_question_id {
            let original = Self::find(pool, original_id).await?;
            if original.is_none_or(|q| q.class_id != new.class_id) {
                return Err(AppError::field(
                    "original_question",
                    "Counter-questions must reference a question in the same classroom.",
                ));
            }
        }

        let flags = new.level.flags();
        let mut tx = pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO questions (original_question_id, user_id, class_id, content, topic, level,
                                   is_basic, is_fundamental, is_practical, is_analytical,
                                   is_inventive, is_critical, is_anonymous)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        let question = sqlx::query_as::<_, Question>(&sql)
            .bind(new.original_question_id)
            .bind(user_id)
            .bind(new.class_id)
            .bind(&new.content)
            .bind(&new.topic)
            .bind(new.level.as_str())
            .bind(flags.is_basic)
            .bind(flags.is_fundamental)
            .bind(flags.is_practical)
            .bind(flags.is_analytical)
            .bind(flags.is_inventive)
            .bind(flags.is_critical)
            .bind(new.is_anonymous)
            .fetch_one(&mut *tx)
            .await?;

        let counter = format!("{}_asked", new.level.counter_prefix());
        let sql = format!(
            "UPDATE users SET questions_asked = questions_asked + 1, {counter} = {counter} + 1 WHERE id = $1"
        );
        sqlx::query(&sql).bind(user_id).execute(&mut *tx).await?;

        tx.commit().await?;
        tracing::info!(
            "User {} asked question {} ({}) in classroom {}",
            user_id,
            question.id,
            question.level,
            question.class_id
        );
        Ok(question)
    }

    pub async fn find(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// A question whose classroom the viewer takes part in.
    pub async fn find_visible(pool: &PgPool, id: i64, viewer_id: i64) -> Result<Self, AppError> {
        let question = Self::find(pool, id).await?.ok_or(AppError::NotFound)?;
        if !Classroom::is_participant(pool, question.class_id, viewer_id).await? {
            return Err(AppError::NotFound);
        }
        Ok(question)
    }

    pub async fn find_owned(pool: &PgPool, id: i64, user_id: i64) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE user_id = $1 ORDER BY timestamp DESC"
        );
        sqlx::query_as::<_, Question>(&sql)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_classroom(pool: &PgPool, class_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE class_id = $1 ORDER BY timestamp DESC"
        );
        sqlx::query_as::<_, Question>(&sql)
            .bind(class_id)
            .fetch_all(pool)
            .await
    }

    pub async fn counter_questions(pool: &PgPool, original_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE original_question_id = $1 ORDER BY timestamp"
        );
        sqlx::query_as::<_, Question>(&sql)
            .bind(original_id)
            .fetch_all(pool)
            .await
    }

    pub async fn update_owned(
        pool: &PgPool,
        id: i64,
        user_id: i64,
        changes: QuestionChanges,
    ) -> Result<Self, AppError> {
        let sql = format!(
            r#"
            UPDATE questions SET
                content = COALESCE($3, content),
                topic = COALESCE($4, topic),
                is_anonymous = COALESCE($5, is_anonymous)
            WHERE id = $1 AND user_id = $2
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(changes.content)
            .bind(changes.topic)
            .bind(changes.is_anonymous)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn delete_owned(pool: &PgPool, id: i64, user_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn search(pool: &PgPool, term: Option<&str>) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {QUESTION_COLUMNS} FROM questions
            WHERE $1::TEXT IS NULL
               OR content ILIKE '%' || $1 || '%'
               OR topic ILIKE '%' || $1 || '%'
            ORDER BY timestamp DESC
            "#
        );
        sqlx::query_as::<_, Question>(&sql)
            .bind(term)
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateQuestionRequest {
        CreateQuestionRequest {
            classroom: Some(Uuid::nil()),
            content: Some("What is a pointer?".into()),
            topic: Some("Memory".into()),
            level: Some("Basic".into()),
            is_anonymous: false,
            original_question: None,
        }
    }

    #[test]
    fn exactly_one_flag_per_level() {
        for level in Level::ALL {
            let flags = level.flags();
            let set = [
                flags.is_basic,
                flags.is_fundamental,
                flags.is_practical,
                flags.is_analytical,
                flags.is_inventive,
                flags.is_critical,
            ]
            .into_iter()
            .filter(|f| *f)
            .count();
            assert_eq!(set, 1, "{level}");
        }
        assert!(Level::Critical.flags().is_critical);
    }

    #[test]
    fn level_parses_exact_names() {
        assert_eq!("Inventive".parse::<Level>().unwrap(), Level::Inventive);
        assert!("inventive".parse::<Level>().is_err());
        assert!("Expert".parse::<Level>().is_err());
    }

    #[test]
    fn valid_question() {
        let new = request().validate().unwrap();
        assert_eq!(new.level, Level::Basic);
        assert_eq!(new.content, "What is a pointer?");
    }

    #[test]
    fn missing_and_invalid_fields() {
        let errors = CreateQuestionRequest {
            classroom: None,
            content: Some("   ".into()),
            topic: None,
            level: Some("Expert".into()),
            ..request()
        }
        .validate()
        .unwrap_err();
        for field in ["classroom", "content", "topic", "level"] {
            assert!(errors.has(field), "{field} accepted");
        }
    }

    #[test]
    fn content_is_capped() {
        let errors = CreateQuestionRequest {
            content: Some("x".repeat(MAX_CONTENT_LEN + 1)),
            ..request()
        }
        .validate()
        .unwrap_err();
        assert!(errors.has("content"));
    }

    #[test]
    fn anonymous_author_is_hidden_from_others() {
        let question = Question {
            id: 1,
            original_question_id: Some(9),
            timestamp: Utc::now(),
            user_id: 7,
            class_id: Uuid::nil(),
            content: "Why?".into(),
            topic: "Logic".into(),
            score: 0,
            level: Level::Critical,
            flags: Level::Critical.flags(),
            is_answered: false,
            is_anonymous: true,
        };

        let own = QuestionView::for_viewer(question.clone(), 7);
        assert_eq!(own.author_id, Some(7));
        assert!(own.is_counter_question);

        let other = QuestionView::for_viewer(question, 8);
        assert_eq!(other.author_id, None);
        assert_eq!(other.level, Level::Critical);
    }
}
