use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::catalog::EnabledStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MembershipPlan {
    pub id: i64,
    pub name: String,
    pub duration_days: i64,
    pub price: i64,
    /// 会员购买商品的折扣（千分比，900 = 九折）
    pub discount_rate: i64,
    pub description: String,
    pub status: EnabledStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Membership {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub started_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub status: MembershipStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MembershipCodeStatus {
    Unused,
    Used,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MembershipCode {
    pub id: i64,
    pub code: String,
    pub plan_id: i64,
    pub batch_no: Option<String>,
    pub status: MembershipCodeStatus,
    pub used_by: Option<i64>,
    pub used_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateMembershipOrderRequest {
    pub plan_id: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemCodeRequest {
    #[schema(example = "A8K2M3PQX7R4N6ST")]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MembershipResponse {
    pub plan_id: i64,
    pub plan_name: String,
    pub discount_rate: i64,
    pub started_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub status: MembershipStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePlanRequest {
    pub name: String,
    pub duration_days: i64,
    pub price: i64,
    pub discount_rate: i64,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub duration_days: Option<i64>,
    pub price: Option<i64>,
    pub discount_rate: Option<i64>,
    pub description: Option<String>,
    pub status: Option<EnabledStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerateCodesRequest {
    pub plan_id: i64,
    #[schema(example = 10)]
    pub count: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerateCodesResponse {
    pub batch_no: String,
    pub codes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MembershipCodeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub plan_id: Option<i64>,
    pub status: Option<MembershipCodeStatus>,
    pub batch_no: Option<String>,
}
