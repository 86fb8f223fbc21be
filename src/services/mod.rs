pub mod auth_service;
pub mod user_service;
pub mod catalog_service;
pub mod cart_service;
pub mod order_service;
pub mod payment_service;
pub mod membership_service;
pub mod distribution_service;
pub mod admin_service;
pub mod system_service;
pub mod chat_service;

pub use auth_service::*;
pub use user_service::*;
pub use catalog_service::*;
pub use cart_service::*;
pub use order_service::*;
pub use payment_service::*;
pub use membership_service::*;
pub use distribution_service::*;
pub use admin_service::*;
pub use system_service::*;
pub use chat_service::*;
