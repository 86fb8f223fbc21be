pub mod alipay;
pub mod wechat_pay;
pub mod paypal;

pub use alipay::*;
pub use wechat_pay::*;
pub use paypal::*;

/// 分转元的字符串表示（支付宝/PayPal 金额格式）
pub fn cents_to_decimal(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cents_to_decimal() {
        assert_eq!(cents_to_decimal(0), "0.00");
        assert_eq!(cents_to_decimal(5), "0.05");
        assert_eq!(cents_to_decimal(1234), "12.34");
        assert_eq!(cents_to_decimal(10000), "100.00");
    }
}
