use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::PaypalConfig;
use crate::error::{AppError, AppResult};
use crate::external::cents_to_decimal;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PaypalOrder {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub purchase_units: Vec<PaypalPurchaseUnit>,
    #[serde(default)]
    pub links: Vec<PaypalLink>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalPurchaseUnit {
    pub reference_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalLink {
    pub href: String,
    pub rel: String,
}

/// PayPal REST v2 订单对接。
///
/// 回调不做本地验签，而是用商户凭证发起 capture，由接口返回的
/// 状态确认订单真实性。
#[derive(Clone)]
pub struct PaypalService {
    client: Client,
    config: PaypalConfig,
}

impl PaypalService {
    pub fn new(config: PaypalConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn access_token(&self) -> AppResult<String> {
        if self.config.client_id.is_empty() {
            return Err(AppError::ConfigError("PayPal 渠道未配置".to_string()));
        }

        let url = format!("{}/v1/oauth2/token", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "未知错误".to_string());
            return Err(AppError::ExternalApiError(format!(
                "获取PayPal令牌失败: {error_text}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// 创建订单，返回 (PayPal订单号, 用户确认链接)
    pub async fn create_order(
        &self,
        reference_id: &str,
        amount_cents: i64,
    ) -> AppResult<(String, Option<String>)> {
        let token = self.access_token().await?;
        let url = format!("{}/v2/checkout/orders", self.config.base_url);

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": reference_id,
                "amount": {
                    "currency_code": "USD",
                    "value": cents_to_decimal(amount_cents),
                }
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.cancel_url,
            }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "未知错误".to_string());
            return Err(AppError::ExternalApiError(format!(
                "创建PayPal订单失败: {error_text}"
            )));
        }

        let order: PaypalOrder = response.json().await?;
        let approve_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.clone());

        Ok((order.id, approve_url))
    }

    /// 请求扣款。APPROVED 状态的订单在回调处理时 capture。
    pub async fn capture_order(&self, order_id: &str) -> AppResult<PaypalOrder> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v2/checkout/orders/{order_id}/capture",
            self.config.base_url
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "未知错误".to_string());
            return Err(AppError::ExternalApiError(format!(
                "PayPal扣款失败: {error_text}"
            )));
        }

        let order: PaypalOrder = response.json().await?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_service_rejected() {
        let svc = PaypalService::new(PaypalConfig::default());
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(svc.access_token());
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_order_links_parsing() {
        let raw = serde_json::json!({
            "id": "5O190127TN364715T",
            "status": "CREATED",
            "links": [
                {"href": "https://api.sandbox.paypal.com/v2/checkout/orders/5O1", "rel": "self", "method": "GET"},
                {"href": "https://www.sandbox.paypal.com/checkoutnow?token=5O1", "rel": "approve", "method": "GET"}
            ]
        });
        let order: PaypalOrder = serde_json::from_value(raw).unwrap();
        assert_eq!(order.status, "CREATED");
        let approve = order.links.iter().find(|l| l.rel == "approve").unwrap();
        assert!(approve.href.contains("checkoutnow"));
    }
}
