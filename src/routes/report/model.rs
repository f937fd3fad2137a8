use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, InvalidChoice, NON_FIELD_ERRORS, ValidationErrors},
    ledger::{self, CoinAdjustment},
    routes::{answer::model::Answer, question::model::Question},
};

pub const DEFAULT_COINS: i32 = 10;
/// Keeps balance arithmetic well inside the INTEGER column range.
pub const MAX_REPORT_COINS: i32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Declined,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Declined => "declined",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "Pending",
            ReportStatus::Resolved => "Resolved",
            ReportStatus::Declined => "Declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Pending)
    }
}

impl FromStr for ReportStatus {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "resolved" => Ok(ReportStatus::Resolved),
            "declined" => Ok(ReportStatus::Declined),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

impl TryFrom<String> for ReportStatus {
    type Error = InvalidChoice;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTarget {
    Question(i64),
    Answer(i64),
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Report {
    pub id: i64,
    pub reporting_user_id: i64,
    pub reported_question_id: Option<i64>,
    pub reported_answer_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: ReportStatus,
    pub coins_deducted: i32,
    pub coins_awarded: i32,
}

const REPORT_COLUMNS: &str = r#"
    id, reporting_user_id, reported_question_id, reported_answer_id, timestamp,
    status, coins_deducted, coins_awarded
"#;

impl Report {
    pub fn target(&self) -> Option<ReportTarget> {
        match (self.reported_question_id, self.reported_answer_id) {
            (Some(q), None) => Some(ReportTarget::Question(q)),
            (None, Some(a)) => Some(ReportTarget::Answer(a)),
            _ => None,
        }
    }

    /// `Report on Question by Alice - Status: Pending`
    pub fn describe(&self, reporter_name: &str) -> String {
        let kind = match self.target() {
            Some(ReportTarget::Question(_)) => "Question",
            _ => "Answer",
        };
        format!(
            "Report on {} by {} - Status: {}",
            kind,
            reporter_name,
            self.status.label()
        )
    }
}

#[derive(Debug, FromRow)]
struct ReportRow {
    #[sqlx(flatten)]
    report: Report,
    reporter_name: String,
}

/// A report as the operator sees it.
#[derive(Debug, Serialize)]
pub struct ReportEntry {
    #[serde(flatten)]
    pub report: Report,
    pub display: String,
}

impl From<ReportRow> for ReportEntry {
    fn from(row: ReportRow) -> Self {
        let display = row.report.describe(&row.reporter_name);
        ReportEntry {
            report: row.report,
            display,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateReportRequest {
    pub reported_question: Option<i64>,
    pub reported_answer: Option<i64>,
}

impl CreateReportRequest {
    pub fn validate(self) -> Result<ReportTarget, ValidationErrors> {
        match (self.reported_question, self.reported_answer) {
            (Some(q), None) => Ok(ReportTarget::Question(q)),
            (None, Some(a)) => Ok(ReportTarget::Answer(a)),
            (Some(_), Some(_)) => Err(ValidationErrors::single(
                NON_FIELD_ERRORS,
                "A report can be for either a question or an answer, not both.",
            )),
            (None, None) => Err(ValidationErrors::single(
                NON_FIELD_ERRORS,
                "A report must be for either a question or an answer.",
            )),
        }
    }
}

/// Operator decision on a report.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewReportRequest {
    pub status: Option<String>,
    pub coins_awarded: Option<i32>,
    pub coins_deducted: Option<i32>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportReview {
    pub status: Option<ReportStatus>,
    pub coins_awarded: Option<i32>,
    pub coins_deducted: Option<i32>,
}

impl ReviewReportRequest {
    pub fn validate(self) -> Result<ReportReview, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let status = match self.status.as_deref() {
            Some(raw) => match raw.trim().parse::<ReportStatus>() {
                Ok(status) => Some(status),
                Err(e) => {
                    errors.add("status", e.to_string());
                    None
                }
            },
            None => None,
        };
        for (field, value) in [
            ("coins_awarded", self.coins_awarded),
            ("coins_deducted", self.coins_deducted),
        ] {
            match value {
                Some(v) if v < 0 => {
                    errors.add(field, "Ensure this value is greater than or equal to 0.");
                }
                Some(v) if v > MAX_REPORT_COINS => errors.add(
                    field,
                    format!("Ensure this value is less than or equal to {}.", MAX_REPORT_COINS),
                ),
                _ => {}
            }
        }

        errors.finish(ReportReview {
            status,
            coins_awarded: self.coins_awarded,
            coins_deducted: self.coins_deducted,
        })
    }
}

/// The two users a report concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parties {
    pub reporter_id: i64,
    pub reported_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ReportStatus,
    pub to: ReportStatus,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A {} report cannot be moved to {}.",
            self.from, self.to
        )
    }
}

impl std::error::Error for TransitionError {}

/// Balance changes caused by moving a report from `from` to `to`.
///
/// Only the move out of `pending` pays out: resolving awards the reporter
/// and fines the reported author, declining fines the reporter. Staying in
/// the same status is a no-op, and terminal statuses cannot be left.
pub fn plan_transition(
    from: ReportStatus,
    to: ReportStatus,
    parties: Parties,
    coins_awarded: i32,
    coins_deducted: i32,
) -> Result<Vec<CoinAdjustment>, TransitionError> {
    if from == to {
        return Ok(Vec::new());
    }
    if from.is_terminal() {
        return Err(TransitionError { from, to });
    }

    let plan = match to {
        ReportStatus::Resolved => vec![
            CoinAdjustment {
                user_id: parties.reporter_id,
                delta: coins_awarded,
            },
            CoinAdjustment {
                user_id: parties.reported_id,
                delta: -coins_deducted,
            },
        ],
        ReportStatus::Declined => vec![CoinAdjustment {
            user_id: parties.reporter_id,
            delta: -coins_deducted,
        }],
        ReportStatus::Pending => Vec::new(),
    };
    Ok(plan)
}

impl Report {
    pub async fn create(
        pool: &PgPool,
        reporter_id: i64,
        target: ReportTarget,
    ) -> Result<Self, AppError> {
        // only content in the reporter's own classrooms can be reported
        let (question_id, answer_id) = match target {
            ReportTarget::Question(id) => {
                Question::find_visible(pool, id, reporter_id).await?;
                (Some(id), None)
            }
            ReportTarget::Answer(id) => {
                Answer::find_visible(pool, id, reporter_id).await?;
                (None, Some(id))
            }
        };

        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reports
                WHERE reporting_user_id = $1
                  AND (reported_question_id = $2 OR reported_answer_id = $3)
            )
            "#,
        )
        .bind(reporter_id)
        .bind(question_id)
        .bind(answer_id)
        .fetch_one(pool)
        .await?;
        if duplicate {
            let noun = if question_id.is_some() { "question" } else { "answer" };
            return Err(AppError::non_field(format!(
                "You have already reported this {}.",
                noun
            )));
        }

        let sql = format!(
            r#"
            INSERT INTO reports (reporting_user_id, reported_question_id, reported_answer_id,
                                 coins_deducted, coins_awarded)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REPORT_COLUMNS}
            "#
        );
        let report = sqlx::query_as::<_, Report>(&sql)
            .bind(reporter_id)
            .bind(question_id)
            .bind(answer_id)
            .bind(DEFAULT_COINS)
            .bind(DEFAULT_COINS)
            .fetch_one(pool)
            .await?;

        tracing::info!("User {} filed report {} ({:?})", reporter_id, report.id, target);
        Ok(report)
    }

    pub async fn find_owned(pool: &PgPool, id: i64, reporter_id: i64) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1 AND reporting_user_id = $2"
        );
        sqlx::query_as::<_, Report>(&sql)
            .bind(id)
            .bind(reporter_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_reporter(pool: &PgPool, reporter_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE reporting_user_id = $1 ORDER BY timestamp DESC"
        );
        sqlx::query_as::<_, Report>(&sql)
            .bind(reporter_id)
            .fetch_all(pool)
            .await
    }

    /// Operator listing, newest first, optionally filtered by status.
    pub async fn list_all(
        pool: &PgPool,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT r.id, r.reporting_user_id, r.reported_question_id, r.reported_answer_id,
                   r.timestamp, r.status, r.coins_deducted, r.coins_awarded,
                   u.disp_name AS reporter_name
            FROM reports r
            JOIN users u ON u.id = r.reporting_user_id
            WHERE $1::TEXT IS NULL OR r.status = $1
            ORDER BY r.timestamp DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(ReportEntry::from).collect())
    }

    /// Applies an operator decision. The row is locked for the duration so
    /// that two reviewers racing on the same report pay out at most once.
    pub async fn review(pool: &PgPool, id: i64, review: ReportReview) -> Result<Self, AppError> {
        let mut tx = pool.begin().await?;

        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1 FOR UPDATE");
        let current = sqlx::query_as::<_, Report>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound)?;

        let amounts_changed = review.coins_awarded.is_some() || review.coins_deducted.is_some();
        if amounts_changed && current.status.is_terminal() {
            return Err(AppError::non_field(
                "Coin amounts can only be changed while the report is pending.",
            ));
        }

        let next_status = review.status.unwrap_or(current.status);
        let coins_awarded = review.coins_awarded.unwrap_or(current.coins_awarded);
        let coins_deducted = review.coins_deducted.unwrap_or(current.coins_deducted);

        // classroom and author of whatever was reported
        let (class_id, reported_id) = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT q.class_id, COALESCE(a.user_id, q.user_id)
            FROM reports r
            LEFT JOIN answers a ON a.id = r.reported_answer_id
            JOIN questions q ON q.id = COALESCE(r.reported_question_id, a.question_id)
            WHERE r.id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let parties = Parties {
            reporter_id: current.reporting_user_id,
            reported_id,
        };
        let plan = plan_transition(current.status, next_status, parties, coins_awarded, coins_deducted)
            .map_err(|e| AppError::field("status", e.to_string()))?;

        for adjustment in &plan {
            ledger::apply(&mut *tx, class_id, *adjustment).await?;
        }

        let sql = format!(
            r#"
            UPDATE reports SET status = $2, coins_awarded = $3, coins_deducted = $4
            WHERE id = $1
            RETURNING {REPORT_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Report>(&sql)
            .bind(id)
            .bind(next_status.as_str())
            .bind(coins_awarded)
            .bind(coins_deducted)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        if current.status != next_status {
            tracing::info!(
                "Report {} moved {} -> {} in classroom {}: {:?}",
                id,
                current.status,
                next_status,
                class_id,
                plan
            );
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTIES: Parties = Parties {
        reporter_id: 1,
        reported_id: 2,
    };

    #[test]
    fn resolving_awards_reporter_and_fines_author() {
        let plan =
            plan_transition(ReportStatus::Pending, ReportStatus::Resolved, PARTIES, 15, 7).unwrap();
        assert_eq!(
            plan,
            vec![
                CoinAdjustment { user_id: 1, delta: 15 },
                CoinAdjustment { user_id: 2, delta: -7 },
            ]
        );
    }

    #[test]
    fn declining_fines_only_the_reporter() {
        let plan =
            plan_transition(ReportStatus::Pending, ReportStatus::Declined, PARTIES, 15, 7).unwrap();
        assert_eq!(plan, vec![CoinAdjustment { user_id: 1, delta: -7 }]);
    }

    #[test]
    fn unchanged_status_pays_nothing() {
        for status in [ReportStatus::Pending, ReportStatus::Resolved, ReportStatus::Declined] {
            assert!(plan_transition(status, status, PARTIES, 10, 10).unwrap().is_empty());
        }
    }

    #[test]
    fn terminal_statuses_cannot_be_left() {
        for (from, to) in [
            (ReportStatus::Resolved, ReportStatus::Declined),
            (ReportStatus::Resolved, ReportStatus::Pending),
            (ReportStatus::Declined, ReportStatus::Resolved),
            (ReportStatus::Declined, ReportStatus::Pending),
        ] {
            let err = plan_transition(from, to, PARTIES, 10, 10).unwrap_err();
            assert_eq!(err, TransitionError { from, to });
        }
    }

    #[test]
    fn report_needs_exactly_one_target() {
        let both = CreateReportRequest {
            reported_question: Some(1),
            reported_answer: Some(2),
        };
        assert!(both.validate().unwrap_err().has(NON_FIELD_ERRORS));
        assert!(CreateReportRequest::default().validate().unwrap_err().has(NON_FIELD_ERRORS));

        let answer = CreateReportRequest {
            reported_answer: Some(2),
            ..Default::default()
        };
        assert_eq!(answer.validate().unwrap(), ReportTarget::Answer(2));
    }

    #[test]
    fn review_validation() {
        let review = ReviewReportRequest {
            status: Some("resolved".into()),
            coins_awarded: Some(20),
            coins_deducted: None,
        }
        .validate()
        .unwrap();
        assert_eq!(review.status, Some(ReportStatus::Resolved));
        assert_eq!(review.coins_awarded, Some(20));

        let errors = ReviewReportRequest {
            status: Some("approved".into()),
            coins_awarded: Some(-1),
            coins_deducted: Some(-5),
        }
        .validate()
        .unwrap_err();
        for field in ["status", "coins_awarded", "coins_deducted"] {
            assert!(errors.has(field), "{field} accepted");
        }
    }

    #[test]
    fn review_amounts_are_capped() {
        let errors = ReviewReportRequest {
            status: None,
            coins_awarded: Some(i32::MAX),
            coins_deducted: Some(MAX_REPORT_COINS + 1),
        }
        .validate()
        .unwrap_err();
        assert!(errors.has("coins_awarded"));
        assert!(errors.has("coins_deducted"));

        let at_cap = ReviewReportRequest {
            status: None,
            coins_awarded: Some(MAX_REPORT_COINS),
            coins_deducted: Some(0),
        }
        .validate();
        assert!(at_cap.is_ok());
    }

    #[test]
    fn describe_names_target_and_status() {
        let report = Report {
            id: 3,
            reporting_user_id: 1,
            reported_question_id: Some(5),
            reported_answer_id: None,
            timestamp: Utc::now(),
            status: ReportStatus::Pending,
            coins_deducted: DEFAULT_COINS,
            coins_awarded: DEFAULT_COINS,
        };
        assert_eq!(report.describe("Alice"), "Report on Question by Alice - Status: Pending");
        assert_eq!(report.target(), Some(ReportTarget::Question(5)));
    }
}
