use std::collections::BTreeMap;
use std::collections::HashMap;

use rand::Rng;
use serde_json::json;

use crate::config::WechatPayConfig;
use crate::error::{AppError, AppResult};

/// 微信支付 v2 商户签名对接。
///
/// 签名规则：非空参数按 key 升序以 key=value& 拼接，
/// 末尾追加 key=API密钥，取 MD5 大写十六进制。
#[derive(Clone)]
pub struct WechatPayService {
    config: WechatPayConfig,
}

impl WechatPayService {
    pub fn new(config: WechatPayConfig) -> Self {
        Self { config }
    }

    /// 构造统一下单参数（客户端据此调起支付）
    pub fn build_prepay_params(
        &self,
        out_trade_no: &str,
        body: &str,
        amount_cents: i64,
    ) -> AppResult<serde_json::Value> {
        if self.config.mch_id.is_empty() || self.config.api_key.is_empty() {
            return Err(AppError::ConfigError("微信支付渠道未配置".to_string()));
        }

        let nonce_str = generate_nonce();
        let mut params = BTreeMap::new();
        params.insert("appid".to_string(), self.config.app_id.clone());
        params.insert("mch_id".to_string(), self.config.mch_id.clone());
        params.insert("nonce_str".to_string(), nonce_str.clone());
        params.insert("body".to_string(), body.to_string());
        params.insert("out_trade_no".to_string(), out_trade_no.to_string());
        params.insert("total_fee".to_string(), amount_cents.to_string());
        params.insert("notify_url".to_string(), self.config.notify_url.clone());
        params.insert("trade_type".to_string(), "NATIVE".to_string());

        let sign = self.sign(&params);

        Ok(json!({
            "appid": self.config.app_id,
            "mch_id": self.config.mch_id,
            "nonce_str": nonce_str,
            "body": body,
            "out_trade_no": out_trade_no,
            "total_fee": amount_cents,
            "notify_url": self.config.notify_url,
            "trade_type": "NATIVE",
            "sign": sign,
        }))
    }

    /// 验证异步通知签名
    pub fn verify_notify(&self, params: &HashMap<String, String>) -> bool {
        let sign = match params.get("sign") {
            Some(s) if !s.is_empty() => s,
            _ => return false,
        };

        let filtered: BTreeMap<String, String> = params
            .iter()
            .filter(|(k, v)| k.as_str() != "sign" && !v.is_empty())
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

        format!(
            "{:X}",
            md5::compute(format!("{}&key={}", joined, self.config.api_key))
        )
    }
}

fn generate_nonce() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> WechatPayService {
        WechatPayService::new(WechatPayConfig {
            app_id: "wx1234567890".to_string(),
            mch_id: "1900000109".to_string(),
            api_key: "192006250b4c09247ec02edce69f6a2d".to_string(),
            notify_url: "https://example.com/webhook/wechat".to_string(),
        })
    }

    #[test]
    fn test_sign_known_vector() {
        // 微信支付文档中的签名示例
        let svc = test_service();
        let mut params = BTreeMap::new();
        params.insert("appid".to_string(), "wxd930ea5d5a258f4f".to_string());
        params.insert("mch_id".to_string(), "10000100".to_string());
        params.insert("device_info".to_string(), "1000".to_string());
        params.insert("body".to_string(), "test".to_string());
        params.insert("nonce_str".to_string(), "ibuaiVcKdpRxkhJA".to_string());

        assert_eq!(svc.sign(&params), "9A0A8659F005D6984697E2CA0A9CF3B7");
    }

    #[test]
    fn test_verify_notify_roundtrip() {
        let svc = test_service();
        let mut params = BTreeMap::new();
        params.insert("out_trade_no".to_string(), "P20250901x".to_string());
        params.insert("transaction_id".to_string(), "4200001".to_string());
        params.insert("result_code".to_string(), "SUCCESS".to_string());
        params.insert("total_fee".to_string(), "1234".to_string());

        let sign = svc.sign(&params);
        let mut notify: HashMap<String, String> = params.into_iter().collect();
        notify.insert("sign".to_string(), sign);

        assert!(svc.verify_notify(&notify));

        notify.insert("total_fee".to_string(), "1".to_string());
        assert!(!svc.verify_notify(&notify));
    }

    #[test]
    fn test_build_prepay_params() {
        let svc = test_service();
        let params = svc.build_prepay_params("P20250901x", "课程订单", 1234).unwrap();
        assert_eq!(params["total_fee"], 1234);
        assert!(params["sign"].as_str().unwrap().len() == 32);
    }
}
