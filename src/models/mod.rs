pub mod common;
pub mod pagination;
pub mod user;
pub mod catalog;
pub mod cart;
pub mod order;
pub mod payment;
pub mod membership;
pub mod distribution;
pub mod admin;
pub mod chat;

pub use common::*;
pub use pagination::*;
pub use user::*;
pub use catalog::*;
pub use cart::*;
pub use order::*;
pub use payment::*;
pub use membership::*;
pub use distribution::*;
pub use admin::*;
pub use chat::*;
