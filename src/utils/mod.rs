pub mod jwt;
pub mod validate;
pub mod password;
pub mod codes;
pub mod rate_limit;

pub use jwt::*;
pub use validate::*;
pub use password::*;
pub use codes::{generate_order_no, generate_payment_no, generate_membership_code, generate_invite_code, generate_batch_no};
pub use rate_limit::{RateLimiter, DedupCache};
