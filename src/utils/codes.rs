use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

/// 生成订单号：日期前缀 + uuid 片段，方便人工排查
pub fn generate_order_no() -> String {
    let date = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("O{}{}", date, &suffix[..8])
}

/// 生成支付流水号
pub fn generate_payment_no() -> String {
    let date = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("P{}{}", date, &suffix[..8])
}

/// 生成会员码：16位大写字母数字（去掉易混淆字符）
pub fn generate_membership_code() -> String {
    const CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// 生成分销邀请码：8位大写字母数字
pub fn generate_invite_code() -> String {
    const CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// 生成会员码批次号
pub fn generate_batch_no() -> String {
    format!("B{}", Utc::now().format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_order_no() {
        let no = generate_order_no();
        assert!(no.starts_with('O'));
        assert_eq!(no.len(), 1 + 14 + 8);
    }

    #[test]
    fn test_generate_membership_code() {
        let code = generate_membership_code();
        assert_eq!(code.len(), 16);
        // 不含易混淆字符
        assert!(!code.contains('O') && !code.contains('0') && !code.contains('I'));
    }

    #[test]
    fn test_invite_codes_differ() {
        let a = generate_invite_code();
        let b = generate_invite_code();
        assert_eq!(a.len(), 8);
        assert_eq!(b.len(), 8);
        // 理论上可能相同，概率可以忽略
        assert_ne!(generate_order_no(), generate_payment_no());
    }
}
