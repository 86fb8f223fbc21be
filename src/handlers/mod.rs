pub mod auth;
pub mod user;
pub mod catalog;
pub mod cart;
pub mod order;
pub mod payment;
pub mod webhook;
pub mod membership;
pub mod distribution;
pub mod chat;
pub mod admin;

pub use auth::auth_config;
pub use user::user_config;
pub use catalog::catalog_config;
pub use cart::cart_config;
pub use order::order_config;
pub use payment::payment_config;
pub use webhook::webhook_config;
pub use membership::membership_config;
pub use distribution::distribution_config;
pub use chat::chat_config;
pub use admin::admin_config;

use actix_web::{HttpMessage, HttpRequest};

/// 从请求扩展中取认证中间件注入的用户ID
pub(crate) fn get_user_id_from_request(req: &HttpRequest) -> Option<i64> {
    req.extensions().get::<i64>().copied()
}

/// 客户端IP，优先信任反向代理头
pub(crate) fn get_client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info()
        .realip_remote_addr()
        .map(|s| s.to_string())
}
