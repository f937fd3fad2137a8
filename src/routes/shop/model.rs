use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::{
    error::{AppError, ValidationErrors},
    ledger,
    routes::question::model::check_text,
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RewardShopItem {
    pub id: i64,
    pub item_name: String,
    pub description: String,
    pub coin_cost: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub timestamp: DateTime<Utc>,
    pub coins_spent: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShopItemRequest {
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub coin_cost: Option<i32>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShopItemFields {
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub coin_cost: Option<i32>,
}

impl ShopItemRequest {
    /// With `partial` unset every field is required.
    pub fn validate(self, partial: bool) -> Result<ShopItemFields, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !partial {
            for (field, missing) in [
                ("item_name", self.item_name.is_none()),
                ("description", self.description.is_none()),
                ("coin_cost", self.coin_cost.is_none()),
            ] {
                if missing {
                    errors.add(field, "This field is required.");
                }
            }
        }
        let item_name = check_text("item_name", self.item_name.as_deref(), Some(255), &mut errors);
        let description = check_text("description", self.description.as_deref(), None, &mut errors);
        if self.coin_cost.is_some_and(|c| c < 0) {
            errors.add("coin_cost", "Ensure this value is greater than or equal to 0.");
        }

        errors.finish(ShopItemFields {
            item_name,
            description,
            coin_cost: self.coin_cost,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub item_id: i64,
}

#[derive(Debug, Serialize)]
pub struct Receipt {
    pub transaction: Transaction,
    pub q_coins: i32,
}

impl RewardShopItem {
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, RewardShopItem>(
            "SELECT id, item_name, description, coin_cost FROM reward_shop_items ORDER BY coin_cost, id",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RewardShopItem>(
            "SELECT id, item_name, description, coin_cost FROM reward_shop_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Expects fields validated with `partial = false`.
    pub async fn create(pool: &PgPool, fields: ShopItemFields) -> Result<Self, AppError> {
        let item = sqlx::query_as::<_, RewardShopItem>(
            r#"
            INSERT INTO reward_shop_items (item_name, description, coin_cost)
            VALUES ($1, $2, $3)
            RETURNING id, item_name, description, coin_cost
            "#,
        )
        .bind(fields.item_name.unwrap_or_default())
        .bind(fields.description.unwrap_or_default())
        .bind(fields.coin_cost.unwrap_or_default())
        .fetch_one(pool)
        .await?;

        tracing::info!("Shop item {} created at {} qCoins", item.id, item.coin_cost);
        Ok(item)
    }

    pub async fn update(pool: &PgPool, id: i64, fields: ShopItemFields) -> Result<Self, AppError> {
        let item = sqlx::query_as::<_, RewardShopItem>(
            r#"
            UPDATE reward_shop_items SET
                item_name = COALESCE($2, item_name),
                description = COALESCE($3, description),
                coin_cost = COALESCE($4, coin_cost)
            WHERE id = $1
            RETURNING id, item_name, description, coin_cost
            "#,
        )
        .bind(id)
        .bind(fields.item_name)
        .bind(fields.description)
        .bind(fields.coin_cost)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;
        Ok(item)
    }

    pub async fn delete(pool: &PgPool, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM reward_shop_items WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

impl Transaction {
    /// Spends the item's cost from the buyer's global balance and records
    /// the purchase. Fails without side effects when the balance is short.
    pub async fn purchase(pool: &PgPool, user_id: i64, item_id: i64) -> Result<Receipt, AppError> {
        let item = RewardShopItem::find(pool, item_id).await?.ok_or_else(|| {
            AppError::field(
                "item_id",
                format!("Invalid pk \"{}\" - object does not exist.", item_id),
            )
        })?;

        let mut tx = pool.begin().await?;

        let Some(balance) = ledger::debit(&mut *tx, user_id, item.coin_cost).await? else {
            return Err(AppError::non_field("Insufficient qCoins."));
        };

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (user_id, item_id, coins_spent)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, item_id, timestamp, coins_spent
            "#,
        )
        .bind(user_id)
        .bind(item.id)
        .bind(item.coin_cost)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "User {} bought item {} for {} qCoins, balance now {}",
            user_id,
            item.id,
            item.coin_cost,
            balance
        );
        Ok(Receipt {
            transaction,
            q_coins: balance,
        })
    }

    pub async fn list_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, item_id, timestamp, coins_spent
            FROM transactions WHERE user_id = $1
            ORDER BY timestamp DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_every_field() {
        let errors = ShopItemRequest::default().validate(false).unwrap_err();
        for field in ["item_name", "description", "coin_cost"] {
            assert!(errors.has(field), "{field} not required");
        }
        assert_eq!(ShopItemRequest::default().validate(true).unwrap(), ShopItemFields::default());
    }

    #[test]
    fn cost_cannot_be_negative() {
        let req = ShopItemRequest {
            coin_cost: Some(-3),
            ..Default::default()
        };
        assert!(req.validate(true).unwrap_err().has("coin_cost"));
    }

    #[test]
    fn item_name_is_trimmed() {
        let fields = ShopItemRequest {
            item_name: Some("  Extra credit ".into()),
            description: Some("One bonus point".into()),
            coin_cost: Some(50),
        }
        .validate(false)
        .unwrap();
        assert_eq!(fields.item_name.as_deref(), Some("Extra credit"));
    }
}
