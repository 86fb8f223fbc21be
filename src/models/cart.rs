use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::catalog::ShelfStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CartItem {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub created_at: NaiveDateTime,
}

/// 购物车条目 + 当前商品信息（联表查询）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CartItemDetail {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub title: String,
    pub cover_url: Option<String>,
    pub price: i64,
    pub product_status: ShelfStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: i64,
    #[schema(example = 1)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartItemDetail>,
    /// 仅统计在售商品
    pub total_amount: i64,
}
