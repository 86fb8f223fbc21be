use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DistributorStatus {
    Pending,
    Approved,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Distributor {
    pub id: i64,
    pub user_id: i64,
    pub invite_code: String,
    /// 千分比，100 = 10%
    pub commission_rate: i64,
    pub total_commission: i64,
    pub available_balance: i64,
    pub status: DistributorStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Settled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DistributionOrder {
    pub id: i64,
    pub distributor_id: i64,
    pub order_id: i64,
    pub buyer_id: i64,
    pub order_amount: i64,
    pub commission_rate: i64,
    pub commission_amount: i64,
    pub status: CommissionStatus,
    pub settled_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CommissionWithdrawal {
    pub id: i64,
    pub distributor_id: i64,
    pub amount: i64,
    pub account_info: String,
    pub status: WithdrawalStatus,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub remark: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DistributorResponse {
    pub id: i64,
    pub invite_code: String,
    pub commission_rate: i64,
    pub total_commission: i64,
    pub available_balance: i64,
    pub status: DistributorStatus,
    pub created_at: NaiveDateTime,
}

impl From<Distributor> for DistributorResponse {
    fn from(d: Distributor) -> Self {
        Self {
            id: d.id,
            invite_code: d.invite_code,
            commission_rate: d.commission_rate,
            total_commission: d.total_commission,
            available_balance: d.available_balance,
            status: d.status,
            created_at: d.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DistributorStats {
    pub referred_users: i64,
    pub total_orders: i64,
    pub pending_commission: i64,
    pub settled_commission: i64,
    pub available_balance: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateWithdrawalRequest {
    pub amount: i64,
    /// 收款账户信息（支付宝账号/银行卡等）
    pub account_info: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewWithdrawalRequest {
    pub approve: bool,
    pub remark: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateDistributorRequest {
    pub commission_rate: Option<i64>,
    pub status: Option<DistributorStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommissionQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<CommissionStatus>,
}
