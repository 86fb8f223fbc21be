use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// 商品类型：课程 / 电子书 / 专栏
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Course,
    Ebook,
    Column,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShelfStatus {
    OnShelf,
    OffShelf,
}

impl std::fmt::Display for ShelfStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShelfStatus::OnShelf => write!(f, "on_shelf"),
            ShelfStatus::OffShelf => write!(f, "off_shelf"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnabledStatus {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub sort_order: i64,
    pub status: EnabledStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Product {
    pub id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub cover_url: Option<String>,
    pub kind: ProductKind,
    pub price: i64, // 分
    pub original_price: Option<i64>,
    pub status: ShelfStatus,
    pub sales_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Banner {
    pub id: i64,
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub sort_order: i64,
    pub status: EnabledStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category_id: Option<i64>,
    pub keyword: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub category_id: Option<i64>,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub kind: ProductKind,
    pub price: i64,
    pub original_price: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub category_id: Option<i64>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub kind: Option<ProductKind>,
    pub price: Option<i64>,
    pub original_price: Option<i64>,
    pub status: Option<ShelfStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub sort_order: Option<i64>,
    pub status: Option<EnabledStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateBannerRequest {
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateBannerRequest {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub sort_order: Option<i64>,
    pub status: Option<EnabledStatus>,
}
