use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// 后台权限模块
pub mod modules {
    pub const CATALOG: &str = "catalog";
    pub const ORDER: &str = "order";
    pub const MEMBERSHIP: &str = "membership";
    pub const DISTRIBUTION: &str = "distribution";
    pub const SYSTEM: &str = "system";
    pub const CHAT: &str = "chat";
}

/// 权限级别：0 无权限 / 1 只读 / 2 管理
pub const LEVEL_NONE: i64 = 0;
pub const LEVEL_READ: i64 = 1;
pub const LEVEL_MANAGE: i64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AdminRole {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RolePermission {
    pub id: i64,
    pub role_id: i64,
    pub module: String,
    pub level: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SystemLog {
    pub id: i64,
    pub admin_id: i64,
    pub module: String,
    pub action: String,
    pub detail: String,
    pub ip: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SecurityAlert {
    pub id: i64,
    pub alert_type: String,
    pub level: AlertLevel,
    pub message: String,
    pub ip: Option<String>,
    pub user_id: Option<i64>,
    pub resolved: bool,
    pub resolved_by: Option<i64>,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SystemConfig {
    pub config_key: String,
    pub config_value: String,
    pub description: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionItem {
    pub module: String,
    pub level: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<PermissionItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    /// 提供时整体替换权限表
    pub permissions: Option<Vec<PermissionItem>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub permissions: Vec<PermissionItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub user_id: i64,
    /// None 表示取消管理员身份
    pub role_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveAlertRequest {
    pub remark: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpsertConfigRequest {
    pub config_key: String,
    pub config_value: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlertQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub level: Option<AlertLevel>,
    pub resolved: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SystemLogQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub module: Option<String>,
    pub admin_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_orders: i64,
    pub paid_orders: i64,
    pub total_revenue: i64,
    pub pending_withdrawals: i64,
    pub open_alerts: i64,
}
