use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Alipay,
    Wechat,
    Paypal,
    Mock,
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentProvider::Alipay => write!(f, "alipay"),
            PaymentProvider::Wechat => write!(f, "wechat"),
            PaymentProvider::Paypal => write!(f, "paypal"),
            PaymentProvider::Mock => write!(f, "mock"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: i64,
    pub payment_no: String,
    pub order_id: i64,
    pub user_id: i64,
    pub provider: PaymentProvider,
    pub amount: i64,
    pub status: PaymentStatus,
    pub provider_txn_id: Option<String>,
    pub notified_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub order_no: String,
    pub provider: PaymentProvider,
}

/// 渠道返回的收银台信息：跳转链接或客户端调起参数
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentResponse {
    pub payment_no: String,
    pub provider: PaymentProvider,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub payment_no: String,
    pub provider: PaymentProvider,
    pub amount: i64,
    pub status: PaymentStatus,
    pub provider_txn_id: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            payment_no: p.payment_no,
            provider: p.provider,
            amount: p.amount,
            status: p.status,
            provider_txn_id: p.provider_txn_id,
            created_at: p.created_at,
        }
    }
}
