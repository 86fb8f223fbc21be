use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 统一错误应答体。成功应答为 {"success": true, "data": ...}
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}
