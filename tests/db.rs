//! Postgres-backed tests. Each `#[sqlx::test]` gets a fresh database with
//! the migrations applied; `DATABASE_URL` must point at a server.

use qboard::{
    error::{AppError, NON_FIELD_ERRORS},
    ledger::UserClassroomStats,
    routes::{
        classroom::model::{Classroom, ClassroomFields, Semester},
        question::model::{Level, NewQuestion, Question},
        report::model::{Report, ReportReview, ReportStatus, ReportTarget},
        user::model::{Institution, NewUser, User},
    },
};
use sqlx::PgPool;
use uuid::Uuid;

fn new_user(email: &str, std_id: i32, institution: Institution) -> NewUser {
    NewUser {
        email: email.to_string(),
        password: "testpass123".to_string(),
        std_id,
        disp_name: email.split('@').next().unwrap_or(email).to_string(),
        institution,
        is_faculty: false,
        is_staff: false,
        is_superuser: false,
    }
}

async fn user(pool: &PgPool, email: &str, std_id: i32) -> User {
    User::create(pool, new_user(email, std_id, Institution::Iub))
        .await
        .unwrap()
}

fn classroom_fields() -> ClassroomFields {
    ClassroomFields {
        institution: Some(Institution::Iub),
        course_id: Some("CSE101".into()),
        course_name: Some("Intro to Programming".into()),
        section: Some(1),
        semester: Some(Semester::new("spring")),
        year: Some(2025),
        description: Some(String::new()),
    }
}

async fn question(pool: &PgPool, author: i64, class_id: Uuid) -> Question {
    Question::create(
        pool,
        author,
        NewQuestion {
            class_id,
            content: "Why does the borrow checker reject this?".into(),
            topic: "Ownership".into(),
            level: Level::Analytical,
            is_anonymous: false,
            original_question_id: None,
        },
    )
    .await
    .unwrap()
}

async fn coins(pool: &PgPool, user_id: i64, class_id: Uuid) -> (i32, Option<i32>) {
    let global = User::find_by_id(pool, user_id).await.unwrap().unwrap().q_coins;
    let classroom = UserClassroomStats::find(pool, user_id, class_id)
        .await
        .unwrap()
        .map(|s| s.coins);
    (global, classroom)
}

fn review(status: Option<ReportStatus>) -> ReportReview {
    ReportReview {
        status,
        ..Default::default()
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn reports_outside_own_classrooms_are_not_found(pool: PgPool) {
    let owner = user(&pool, "owner@example.com", 1001).await;
    let outsider = user(&pool, "outsider@example.com", 1002).await;
    let class = Classroom::create(&pool, owner.id, classroom_fields()).await.unwrap();
    let q = question(&pool, owner.id, class.class_id).await;

    let err = Report::create(&pool, outsider.id, ReportTarget::Question(q.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound), "{err}");

    // a missing id looks the same as someone else's
    let err = Report::create(&pool, outsider.id, ReportTarget::Question(q.id + 1000))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound), "{err}");

    assert_eq!(coins(&pool, outsider.id, class.class_id).await, (0, None));
}

#[sqlx::test(migrations = "./migrations")]
async fn resolving_pays_out_once(pool: PgPool) {
    let owner = user(&pool, "owner@example.com", 1001).await;
    let author = user(&pool, "author@example.com", 1002).await;
    let reporter = user(&pool, "reporter@example.com", 1003).await;
    let class = Classroom::create(&pool, owner.id, classroom_fields()).await.unwrap();
    Classroom::join(&pool, class.class_id, author.id).await.unwrap();
    Classroom::join(&pool, class.class_id, reporter.id).await.unwrap();
    let q = question(&pool, author.id, class.class_id).await;

    let report = Report::create(&pool, reporter.id, ReportTarget::Question(q.id))
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Pending);

    // the reporter's classroom row is rebuilt by the ledger write
    sqlx::query("DELETE FROM user_classroom_stats WHERE user_id = $1")
        .bind(reporter.id)
        .execute(&pool)
        .await
        .unwrap();

    let amended = Report::review(
        &pool,
        report.id,
        ReportReview {
            status: None,
            coins_awarded: Some(15),
            coins_deducted: Some(7),
        },
    )
    .await
    .unwrap();
    assert_eq!(amended.status, ReportStatus::Pending);
    assert_eq!(coins(&pool, reporter.id, class.class_id).await, (0, None));

    let resolved = Report::review(&pool, report.id, review(Some(ReportStatus::Resolved)))
        .await
        .unwrap();
    assert_eq!(resolved.status, ReportStatus::Resolved);
    assert_eq!(coins(&pool, reporter.id, class.class_id).await, (15, Some(15)));
    assert_eq!(coins(&pool, author.id, class.class_id).await, (-7, Some(-7)));

    // saving the same status again changes nothing
    Report::review(&pool, report.id, review(Some(ReportStatus::Resolved)))
        .await
        .unwrap();
    assert_eq!(coins(&pool, reporter.id, class.class_id).await, (15, Some(15)));
    assert_eq!(coins(&pool, author.id, class.class_id).await, (-7, Some(-7)));

    let err = Report::review(&pool, report.id, review(Some(ReportStatus::Declined)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref e) if e.has("status")), "{err}");

    let err = Report::review(
        &pool,
        report.id,
        ReportReview {
            coins_awarded: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "{err}");
    assert_eq!(coins(&pool, reporter.id, class.class_id).await, (15, Some(15)));
}

#[sqlx::test(migrations = "./migrations")]
async fn declining_fines_the_reporter(pool: PgPool) {
    let owner = user(&pool, "owner@example.com", 1001).await;
    let reporter = user(&pool, "reporter@example.com", 1003).await;
    let class = Classroom::create(&pool, owner.id, classroom_fields()).await.unwrap();
    Classroom::join(&pool, class.class_id, reporter.id).await.unwrap();
    let q = question(&pool, owner.id, class.class_id).await;

    let report = Report::create(&pool, reporter.id, ReportTarget::Question(q.id))
        .await
        .unwrap();
    Report::review(&pool, report.id, review(Some(ReportStatus::Declined)))
        .await
        .unwrap();

    assert_eq!(coins(&pool, reporter.id, class.class_id).await, (-10, Some(-10)));
    assert_eq!(coins(&pool, owner.id, class.class_id).await, (0, Some(0)));

    let err = Report::create(&pool, reporter.id, ReportTarget::Question(q.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref e) if e.has(NON_FIELD_ERRORS)), "{err}");
}

#[sqlx::test(migrations = "./migrations")]
async fn classrooms_are_scoped_to_their_owner(pool: PgPool) {
    let owner = user(&pool, "owner@example.com", 1001).await;
    let other = user(&pool, "other@example.com", 1002).await;
    let class = Classroom::create(&pool, owner.id, classroom_fields()).await.unwrap();

    assert!(Classroom::find_owned(&pool, class.class_id, other.id).await.unwrap().is_none());
    assert!(Classroom::list_for_owner(&pool, other.id).await.unwrap().is_empty());

    let patch = ClassroomFields {
        course_name: Some("Hijacked".into()),
        ..Default::default()
    };
    let err = Classroom::update_owned(&pool, class.class_id, other.id, patch)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound), "{err}");

    let err = Classroom::delete_owned(&pool, class.class_id, other.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound), "{err}");

    let kept = Classroom::find_owned(&pool, class.class_id, owner.id).await.unwrap().unwrap();
    assert_eq!(kept.course_name, "Intro to Programming");
    assert_eq!(Classroom::list_for_owner(&pool, owner.id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn std_id_is_unique_per_institution(pool: PgPool) {
    let first = user(&pool, "first@example.com", 2021065).await;

    assert!(User::std_id_taken(&pool, 2021065, Institution::Iub, None).await.unwrap());
    assert!(!User::std_id_taken(&pool, 2021065, Institution::Iub, Some(first.id)).await.unwrap());
    assert!(!User::std_id_taken(&pool, 2021065, Institution::Du, None).await.unwrap());

    User::create(&pool, new_user("du@example.com", 2021065, Institution::Du))
        .await
        .unwrap();

    let err = User::create(&pool, new_user("second@example.com", 2021065, Institution::Iub))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref e) if e.has(NON_FIELD_ERRORS)), "{err}");
}

#[sqlx::test(migrations = "./migrations")]
async fn owners_cannot_be_deleted(pool: PgPool) {
    let owner = user(&pool, "owner@example.com", 1001).await;
    let loner = user(&pool, "loner@example.com", 1002).await;
    Classroom::create(&pool, owner.id, classroom_fields()).await.unwrap();

    let err = User::delete(&pool, owner.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err}");
    assert!(User::find_by_id(&pool, owner.id).await.unwrap().is_some());

    User::delete(&pool, loner.id).await.unwrap();
    assert!(User::find_by_id(&pool, loner.id).await.unwrap().is_none());
}
