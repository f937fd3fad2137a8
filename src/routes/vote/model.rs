use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::{
    error::{AppError, InvalidChoice, NON_FIELD_ERRORS, ValidationErrors},
    routes::{answer::model::Answer, question::model::Question},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Upvote => "upvote",
            VoteType::Downvote => "downvote",
        }
    }
}

impl FromStr for VoteType {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteType::Upvote),
            "downvote" => Ok(VoteType::Downvote),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

impl TryFrom<String> for VoteType {
    type Error = InvalidChoice;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a vote is cast on; each kind has its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Question,
    Answer,
}

impl VoteTarget {
    fn table(&self) -> &'static str {
        match self {
            VoteTarget::Question => "question_votes",
            VoteTarget::Answer => "answer_votes",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            VoteTarget::Question => "question_id",
            VoteTarget::Answer => "answer_id",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            VoteTarget::Question => "question",
            VoteTarget::Answer => "answer",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    pub target_id: i64,
    #[sqlx(try_from = "String")]
    pub vote_type: VoteType,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote_type: Option<String>,
}

impl VoteRequest {
    pub fn validate(self) -> Result<VoteType, ValidationErrors> {
        match self.vote_type.as_deref().map(str::trim) {
            None | Some("") => Err(ValidationErrors::single("vote_type", "This field is required.")),
            Some(raw) => raw
                .parse()
                .map_err(|e: InvalidChoice| ValidationErrors::single("vote_type", e.to_string())),
        }
    }
}

impl Vote {
    /// One vote per (user, target); a second one is a validation error.
    pub async fn cast(
        pool: &PgPool,
        target: VoteTarget,
        target_id: i64,
        user_id: i64,
        vote_type: VoteType,
    ) -> Result<Self, AppError> {
        match target {
            VoteTarget::Question => {
                Question::find_visible(pool, target_id, user_id).await?;
            }
            VoteTarget::Answer => {
                Answer::find_visible(pool, target_id, user_id).await?;
            }
        }

        let (table, column) = (target.table(), target.column());
        let exists_sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {table} WHERE user_id = $1 AND {column} = $2)"
        );
        let exists: bool = sqlx::query_scalar(&exists_sql)
            .bind(user_id)
            .bind(target_id)
            .fetch_one(pool)
            .await?;
        if exists {
            return Err(AppError::field(
                NON_FIELD_ERRORS,
                format!("You have already voted on this {}.", target.noun()),
            ));
        }

        let sql = format!(
            r#"
            INSERT INTO {table} (user_id, {column}, vote_type)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, {column} AS target_id, vote_type
            "#
        );
        let vote = sqlx::query_as::<_, Vote>(&sql)
            .bind(user_id)
            .bind(target_id)
            .bind(vote_type.as_str())
            .fetch_one(pool)
            .await?;

        tracing::debug!(
            "User {} cast {} on {} {}",
            user_id,
            vote_type,
            target.noun(),
            target_id
        );
        Ok(vote)
    }

    pub async fn retract(
        pool: &PgPool,
        target: VoteTarget,
        target_id: i64,
        user_id: i64,
    ) -> Result<(), AppError> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
            target.table(),
            target.column()
        );
        let result = sqlx::query(&sql)
            .bind(user_id)
            .bind(target_id)
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
    fn vote_type_choices() {
        let ok = VoteRequest { vote_type: Some("downvote".into()) }.validate();
        assert_eq!(ok.unwrap(), VoteType::Downvote);

        for bad in [None, Some(""), Some("sideways"), Some("Upvote")] {
            let errors = VoteRequest { vote_type: bad.map(String::from) }
                .validate()
                .unwrap_err();
            assert!(errors.has("vote_type"), "{bad:?} accepted");
        }
    }

    #[test]
    fn targets_use_their_own_tables() {
        assert_eq!(VoteTarget::Question.table(), "question_votes");
        assert_eq!(VoteTarget::Answer.column(), "answer_id");
    }
}
