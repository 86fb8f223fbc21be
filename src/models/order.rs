use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Product,
    Membership,
}

/// 订单状态机：pending -> paid / cancelled / expired，终态不再迁移
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Expired,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Paid => write!(f, "paid"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Order {
    pub id: i64,
    pub order_no: String,
    pub user_id: i64,
    pub kind: OrderKind,
    pub plan_id: Option<i64>,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub payable_amount: i64,
    pub status: OrderStatus,
    pub expires_at: Option<NaiveDateTime>,
    pub paid_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_title: String,
    pub unit_price: i64,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemInput {
    pub product_id: i64,
    #[schema(example = 1)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    /// 直接下单的商品；为空时从购物车结算
    pub items: Option<Vec<OrderItemInput>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub order_no: String,
    pub kind: OrderKind,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub payable_amount: i64,
    pub status: OrderStatus,
    pub expires_at: Option<NaiveDateTime>,
    pub paid_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItem>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            order_no: o.order_no,
            kind: o.kind,
            total_amount: o.total_amount,
            discount_amount: o.discount_amount,
            payable_amount: o.payable_amount,
            status: o.status,
            expires_at: o.expires_at,
            paid_at: o.paid_at,
            created_at: o.created_at,
        }
    }
}
