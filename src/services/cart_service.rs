use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::*;

/// 每个用户购物车最多保留的商品种类数
const CART_CAPACITY: i64 = 50;

#[derive(Clone)]
pub struct CartService {
    pool: SqlitePool,
}

impl CartService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add_item(&self, user_id: i64, request: AddCartItemRequest) -> AppResult<()> {
        let quantity = request.quantity.unwrap_or(1);
        if quantity < 1 || quantity > 99 {
            return Err(AppError::ValidationError("数量必须在1-99之间".to_string()));
        }

        // 商品必须在售
        let on_shelf: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM products WHERE id = ? AND status = 'on_shelf'",
        )
        .bind(request.product_id)
        .fetch_optional(&self.pool)
        .await?;
        if on_shelf.is_none() {
            return Err(AppError::NotFound("商品不存在或已下架".to_string()));
        }

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        if count >= CART_CAPACITY {
            return Err(AppError::ValidationError(format!(
                "购物车最多容纳{CART_CAPACITY}种商品"
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, product_id)
            DO UPDATE SET quantity = MIN(quantity + excluded.quantity, 99)
            "#,
        )
        .bind(user_id)
        .bind(request.product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_cart(&self, user_id: i64) -> AppResult<CartResponse> {
        let items = sqlx::query_as::<_, CartItemDetail>(
            r#"
            SELECT
                c.id, c.product_id, c.quantity,
                p.title, p.cover_url, p.price,
                p.status AS product_status,
                c.created_at
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = ?
            ORDER BY c.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let total_amount = items
            .iter()
            .filter(|i| i.product_status == ShelfStatus::OnShelf)
            .map(|i| i.price * i.quantity)
            .sum();

        Ok(CartResponse {
            items,
            total_amount,
        })
    }

    pub async fn update_item(
        &self,
        user_id: i64,
        item_id: i64,
        request: UpdateCartItemRequest,
    ) -> AppResult<()> {
        if request.quantity < 1 || request.quantity > 99 {
            return Err(AppError::ValidationError("数量必须在1-99之间".to_string()));
        }

        let result = sqlx::query(
            "UPDATE cart_items SET quantity = ? WHERE id = ? AND user_id = ?",
        )
        .bind(request.quantity)
        .bind(item_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("购物车条目不存在".to_string()));
        }
        Ok(())
    }

    pub async fn remove_item(&self, user_id: i64, item_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = ? AND user_id = ?")
            .bind(item_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("购物车条目不存在".to_string()));
        }
        Ok(())
    }

    pub async fn clear(&self, user_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
