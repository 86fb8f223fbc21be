use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::config::AlipayConfig;
use crate::error::{AppError, AppResult};
use crate::external::cents_to_decimal;

/// 支付宝 mapi 网关（MD5 签名）对接。
///
/// 签名规则：参数按 key 升序排列，过滤空值与 sign/sign_type，
/// 以 key=value&... 拼接后直接追加密钥，取 MD5 小写十六进制。
#[derive(Clone)]
pub struct AlipayService {
    config: AlipayConfig,
}

impl AlipayService {
    pub fn new(config: AlipayConfig) -> Self {
        Self { config }
    }

    /// 生成收银台跳转链接
    pub fn build_pay_url(
        &self,
        out_trade_no: &str,
        subject: &str,
        amount_cents: i64,
    ) -> AppResult<String> {
        if self.config.partner_id.is_empty() || self.config.md5_key.is_empty() {
            return Err(AppError::ConfigError("支付宝渠道未配置".to_string()));
        }

        let mut params = BTreeMap::new();
        params.insert("service".to_string(), "create_direct_pay_by_user".to_string());
        params.insert("partner".to_string(), self.config.partner_id.clone());
        params.insert("seller_id".to_string(), self.config.partner_id.clone());
        params.insert("_input_charset".to_string(), "utf-8".to_string());
        params.insert("payment_type".to_string(), "1".to_string());
        params.insert("notify_url".to_string(), self.config.notify_url.clone());
        params.insert("return_url".to_string(), self.config.return_url.clone());
        params.insert("out_trade_no".to_string(), out_trade_no.to_string());
        params.insert("subject".to_string(), subject.to_string());
        params.insert("total_fee".to_string(), cents_to_decimal(amount_cents));

        let sign = self.sign(&params);
        params.insert("sign".to_string(), sign);
        params.insert("sign_type".to_string(), "MD5".to_string());

        let url = reqwest::Url::parse_with_params(&self.config.gateway, params.iter())
            .map_err(|e| AppError::InternalError(format!("构造支付宝链接失败: {e}")))?;

        Ok(url.to_string())
    }

    /// 验证异步通知签名
    pub fn verify_notify(&self, params: &HashMap<String, String>) -> bool {
        let sign = match params.get("sign") {
            Some(s) if !s.is_empty() => s,
            _ => return false,
        };

        let filtered: BTreeMap<String, String> = params
            .iter()
            .filter(|(k, v)| k.as_str() != "sign" && k.as_str() != "sign_type" && !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.sign(&filtered) == *sign
    }

    fn sign(&self, params: &BTreeMap<String, String>) -> String {
        let joined = params
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        format!("{:x}", md5::compute(format!("{}{}", joined, self.config.md5_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> AlipayService {
        AlipayService::new(AlipayConfig {
            gateway: "https://mapi.alipay.com/gateway.do".to_string(),
            partner_id: "2088000000000000".to_string(),
            md5_key: "test_md5_key".to_string(),
            notify_url: "https://example.com/webhook/alipay".to_string(),
            return_url: "https://example.com/pay/return".to_string(),
        })
    }

    #[test]
    fn test_build_pay_url() {
        let svc = test_service();
        let url = svc.build_pay_url("O20250901120000abcd1234", "测试订单", 1234).unwrap();
        assert!(url.starts_with("https://mapi.alipay.com/gateway.do?"));
        assert!(url.contains("total_fee=12.34"));
        assert!(url.contains("sign_type=MD5"));
    }

    #[test]
    fn test_verify_notify_roundtrip() {
        let svc = test_service();
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("out_trade_no".to_string(), "P20250901x".to_string());
        params.insert("trade_no".to_string(), "2025090122001".to_string());
        params.insert("trade_status".to_string(), "TRADE_SUCCESS".to_string());
        params.insert("total_fee".to_string(), "12.34".to_string());

        let sign = svc.sign(&params);
        let mut notify: HashMap<String, String> = params.into_iter().collect();
        notify.insert("sign".to_string(), sign);
        notify.insert("sign_type".to_string(), "MD5".to_string());

        assert!(svc.verify_notify(&notify));

        // 篡改金额后签名应失效
        notify.insert("total_fee".to_string(), "0.01".to_string());
        assert!(!svc.verify_notify(&notify));
    }

    #[test]
    fn test_verify_notify_missing_sign() {
        let svc = test_service();
        let notify: HashMap<String, String> =
            [("trade_status".to_string(), "TRADE_SUCCESS".to_string())].into();
        assert!(!svc.verify_notify(&notify));
    }
}
