use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::{
    error::{AppError, ValidationErrors},
    routes::question::model::{Question, check_text},
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub user_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

const ANSWER_COLUMNS: &str = "id, question_id, user_id, content, timestamp";

#[derive(Debug, Default, Deserialize)]
pub struct AnswerRequest {
    pub content: Option<String>,
}

impl AnswerRequest {
    pub fn validate(self) -> Result<String, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.content.is_none() {
            errors.add("content", "This field is required.");
        }
        let content = check_text("content", self.content.as_deref(), None, &mut errors);
        match content {
            Some(content) if errors.is_empty() => Ok(content),
            _ => Err(errors),
        }
    }
}

impl Answer {
    /// Records the answer, marks the question answered and bumps the
    /// answerer's per-level counters, all or nothing.
    pub async fn create(
        pool: &PgPool,
        question_id: i64,
        user_id: i64,
        content: String,
    ) -> Result<Self, AppError> {
        let question = Question::find_visible(pool, question_id, user_id).await?;

        let mut tx = pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO answers (question_id, user_id, content)
            VALUES ($1, $2, $3)
            RETURNING {ANSWER_COLUMNS}
            "#
        );
        let answer = sqlx::query_as::<_, Answer>(&sql)
            .bind(question.id)
            .bind(user_id)
            .bind(content)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE questions SET is_answered = TRUE WHERE id = $1")
            .bind(question.id)
            .execute(&mut *tx)
            .await?;

        let counter = format!("{}_answered", question.level.counter_prefix());
        let sql = format!(
            "UPDATE users SET questions_answered = questions_answered + 1, {counter} = {counter} + 1 WHERE id = $1"
        );
        sqlx::query(&sql).bind(user_id).execute(&mut *tx).await?;

        tx.commit().await?;
        tracing::info!("User {} answered question {}", user_id, question.id);
        Ok(answer)
    }

    pub async fn find(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE id = $1");
        sqlx::query_as::<_, Answer>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// An answer on a question the viewer can see.
    pub async fn find_visible(pool: &PgPool, id: i64, viewer_id: i64) -> Result<Self, AppError> {
        let answer = Self::find(pool, id).await?.ok_or(AppError::NotFound)?;
        Question::find_visible(pool, answer.question_id, viewer_id).await?;
        Ok(answer)
    }

    pub async fn find_owned(pool: &PgPool, id: i64, user_id: i64) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Answer>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_question(pool: &PgPool, question_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE question_id = $1 ORDER BY timestamp"
        );
        sqlx::query_as::<_, Answer>(&sql)
            .bind(question_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE user_id = $1 ORDER BY timestamp DESC"
        );
        sqlx::query_as::<_, Answer>(&sql)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn update_owned(
        pool: &PgPool,
        id: i64,
        user_id: i64,
        content: String,
    ) -> Result<Self, AppError> {
        let sql = format!(
            "UPDATE answers SET content = $3 WHERE id = $1 AND user_id = $2 RETURNING {ANSWER_COLUMNS}"
        );
        sqlx::query_as::<_, Answer>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(content)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn delete_owned(pool: &PgPool, id: i64, user_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM answers WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_required_and_trimmed() {
        assert!(AnswerRequest::default().validate().unwrap_err().has("content"));
        assert!(
            AnswerRequest { content: Some("  ".into()) }
                .validate()
                .unwrap_err()
                .has("content")
        );
        assert_eq!(
            AnswerRequest { content: Some(" A long answer. ".into()) }.validate().unwrap(),
            "A long answer."
        );
    }
}
