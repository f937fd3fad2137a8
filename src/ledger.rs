//! qCoin balances. Every write is an in-place increment (`coins = coins + $n`)
//! so concurrent adjustments never overwrite each other.

use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserClassroomStats {
    pub user_id: i64,
    pub class_id: Uuid,
    pub score: i32,
    pub coins: i32,
    pub rank: String,
}

impl UserClassroomStats {
    pub async fn find(
        pool: &PgPool,
        user_id: i64,
        class_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserClassroomStats>(
            r#"
            SELECT user_id, class_id, score, coins, rank
            FROM user_classroom_stats
            WHERE user_id = $1 AND class_id = $2
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_optional(pool)
        .await
    }
}

/// Signed change to one user's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinAdjustment {
    pub user_id: i64,
    pub delta: i32,
}

/// Applies `adj` to the global balance and to the classroom balance. A
/// missing classroom stats row is created holding just the delta.
pub async fn apply(
    conn: &mut PgConnection,
    class_id: Uuid,
    adj: CoinAdjustment,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET q_coins = q_coins + $2 WHERE id = $1")
        .bind(adj.user_id)
        .bind(adj.delta)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO user_classroom_stats (user_id, class_id, coins)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, class_id)
        DO UPDATE SET coins = user_classroom_stats.coins + EXCLUDED.coins
        "#,
    )
    .bind(adj.user_id)
    .bind(class_id)
    .bind(adj.delta)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        "Applied {} qCoins to user {} in classroom {}",
        adj.delta,
        adj.user_id,
        class_id
    );
    Ok(())
}

/// Takes `amount` from the global balance only if it covers it.
/// Returns the new balance, or `None` when funds are insufficient.
pub async fn debit(
    conn: &mut PgConnection,
    user_id: i64,
    amount: i32,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE users SET q_coins = q_coins - $2
        WHERE id = $1 AND q_coins >= $2
        RETURNING q_coins
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await
}
