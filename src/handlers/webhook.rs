use std::collections::HashMap;

use actix_web::{web, HttpResponse, Result};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::services::PaymentService;

/// 支付宝异步通知（form编码，按文档要求应答纯文本 success/failure）
pub async fn alipay_webhook(
    payment_service: web::Data<PaymentService>,
    form: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse> {
    let params = form.into_inner();

    if !payment_service.alipay().verify_notify(&params) {
        warn!("Alipay notification signature verification failed");
        return Ok(HttpResponse::Ok().body("failure"));
    }

    let payment_no = match params.get("out_trade_no") {
        Some(no) if !no.is_empty() => no.clone(),
        _ => return Ok(HttpResponse::Ok().body("failure")),
    };
    let trade_no = params.get("trade_no").cloned();
    let trade_status = params.get("trade_status").map(String::as_str).unwrap_or("");

    // 重复通知直接应答成功，支付宝才会停止重发。
    // 去重只在处理成功后记账，处理失败的通知要留给渠道重试
    let dedup_key = format!("alipay:{payment_no}:{trade_status}");
    if payment_service.is_duplicate_notification(&dedup_key) {
        return Ok(HttpResponse::Ok().body("success"));
    }

    match trade_status {
        "TRADE_SUCCESS" | "TRADE_FINISHED" => {
            let paid_amount = params.get("total_fee").and_then(|v| parse_decimal_cents(v));
            match payment_service
                .handle_success(&payment_no, trade_no.as_deref(), paid_amount)
                .await
            {
                Ok(()) => {
                    payment_service.mark_notification(&dedup_key);
                    Ok(HttpResponse::Ok().body("success"))
                }
                Err(e) => {
                    error!("Failed to process Alipay notification for {payment_no}: {e:?}");
                    Ok(HttpResponse::Ok().body("failure"))
                }
            }
        }
        "TRADE_CLOSED" => {
            match payment_service.handle_failure(&payment_no).await {
                Ok(()) => payment_service.mark_notification(&dedup_key),
                Err(e) => error!("Failed to close Alipay payment {payment_no}: {e:?}"),
            }
            Ok(HttpResponse::Ok().body("success"))
        }
        other => {
            info!("Ignoring Alipay notification with trade_status {other}");
            Ok(HttpResponse::Ok().body("success"))
        }
    }
}

/// 微信支付异步通知
pub async fn wechat_webhook(
    payment_service: web::Data<PaymentService>,
    body: web::Json<HashMap<String, String>>,
) -> Result<HttpResponse> {
    let params = body.into_inner();

    if !payment_service.wechat().verify_notify(&params) {
        warn!("WeChat Pay notification signature verification failed");
        return Ok(HttpResponse::Ok().json(json!({
            "return_code": "FAIL",
            "return_msg": "签名失败"
        })));
    }

    let payment_no = match params.get("out_trade_no") {
        Some(no) if !no.is_empty() => no.clone(),
        _ => {
            return Ok(HttpResponse::Ok().json(json!({
                "return_code": "FAIL",
                "return_msg": "缺少商户订单号"
            })));
        }
    };
    let transaction_id = params.get("transaction_id").cloned();
    let result_code = params.get("result_code").map(String::as_str).unwrap_or("");

    let dedup_key = format!("wechat:{payment_no}:{result_code}");
    if payment_service.is_duplicate_notification(&dedup_key) {
        return Ok(HttpResponse::Ok().json(json!({"return_code": "SUCCESS"})));
    }

    if result_code == "SUCCESS" {
        // total_fee 单位为分
        let paid_amount = params.get("total_fee").and_then(|v| v.parse::<i64>().ok());
        match payment_service
            .handle_success(&payment_no, transaction_id.as_deref(), paid_amount)
            .await
        {
            Ok(()) => {
                payment_service.mark_notification(&dedup_key);
                Ok(HttpResponse::Ok().json(json!({"return_code": "SUCCESS"})))
            }
            Err(e) => {
                error!("Failed to process WeChat notification for {payment_no}: {e:?}");
                Ok(HttpResponse::Ok().json(json!({
                    "return_code": "FAIL",
                    "return_msg": "处理失败"
                })))
            }
        }
    } else {
        match payment_service.handle_failure(&payment_no).await {
            Ok(()) => payment_service.mark_notification(&dedup_key),
            Err(e) => error!("Failed to mark WeChat payment {payment_no} as failed: {e:?}"),
        }
        Ok(HttpResponse::Ok().json(json!({"return_code": "SUCCESS"})))
    }
}

#[derive(Debug, Deserialize)]
struct PaypalWebhookEvent {
    event_type: String,
    resource: serde_json::Value,
}

/// PayPal Webhook。不信任回调内容，反查 PayPal 订单后再入账。
pub async fn paypal_webhook(
    payment_service: web::Data<PaymentService>,
    body: web::Json<PaypalWebhookEvent>,
) -> Result<HttpResponse> {
    let event = body.into_inner();
    info!("Received PayPal webhook event: {}", event.event_type);

    let order_id = match event.resource.get("id").and_then(|v| v.as_str()) {
        Some(id) => id.to_string(),
        None => return Ok(HttpResponse::Ok().json(json!({"received": true}))),
    };

    let dedup_key = format!("paypal:{order_id}:{}", event.event_type);
    if payment_service.is_duplicate_notification(&dedup_key) {
        return Ok(HttpResponse::Ok().json(json!({"received": true})));
    }

    match event.event_type.as_str() {
        "CHECKOUT.ORDER.APPROVED" => {
            // 用户已确认，发起扣款并反查结果
            let captured = match payment_service.paypal().capture_order(&order_id).await {
                Ok(order) => order,
                Err(e) => {
                    error!("Failed to capture PayPal order {order_id}: {e:?}");
                    return Ok(HttpResponse::Ok().json(json!({"received": true})));
                }
            };

            if captured.status != "COMPLETED" {
                warn!(
                    "PayPal order {order_id} capture status {} ignored",
                    captured.status
                );
                return Ok(HttpResponse::Ok().json(json!({"received": true})));
            }

            let payment_no = captured
                .purchase_units
                .first()
                .and_then(|u| u.reference_id.clone());
            if let Some(payment_no) = payment_no {
                // 金额已在创建订单时由 PayPal 固定，反查通过即可入账
                match payment_service
                    .handle_success(&payment_no, Some(&order_id), None)
                    .await
                {
                    Ok(()) => payment_service.mark_notification(&dedup_key),
                    Err(e) => error!("Failed to process PayPal capture for {payment_no}: {e:?}"),
                }
            }
        }
        "CHECKOUT.ORDER.VOIDED" | "PAYMENT.CAPTURE.DENIED" => {
            if let Ok(Some(payment)) = payment_service.find_by_provider_txn(&order_id).await {
                match payment_service.handle_failure(&payment.payment_no).await {
                    Ok(()) => payment_service.mark_notification(&dedup_key),
                    Err(e) => error!("Failed to mark PayPal payment as failed: {e:?}"),
                }
            }
        }
        other => {
            info!("Ignoring PayPal event type {other}");
        }
    }

    Ok(HttpResponse::Ok().json(json!({"received": true})))
}

#[derive(Debug, Deserialize)]
struct MockNotifyRequest {
    payment_no: String,
    result: String,
    sign: String,
    amount: Option<i64>,
}

/// mock 渠道回调，仅在开发环境开启
pub async fn mock_webhook(
    payment_service: web::Data<PaymentService>,
    body: web::Json<MockNotifyRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    if !payment_service.verify_mock_sign(&request.payment_no, &request.sign) {
        warn!("Mock notification signature verification failed");
        return Ok(HttpResponse::Unauthorized().json(json!({
            "success": false,
            "error": {"code": "INVALID_SIGN", "message": "签名验证失败"}
        })));
    }

    let dedup_key = format!("mock:{}:{}", request.payment_no, request.result);
    if payment_service.is_duplicate_notification(&dedup_key) {
        return Ok(HttpResponse::Ok().json(json!({"success": true})));
    }

    let result = if request.result == "success" {
        payment_service
            .handle_success(&request.payment_no, None, request.amount)
            .await
    } else {
        payment_service.handle_failure(&request.payment_no).await
    };

    match result {
        Ok(()) => {
            payment_service.mark_notification(&dedup_key);
            Ok(HttpResponse::Ok().json(json!({"success": true})))
        }
        Err(e) => {
            error!(
                "Failed to process mock notification for {}: {e:?}",
                request.payment_no
            );
            Ok(HttpResponse::Ok().json(json!({
                "success": false,
                "error": {"code": "PROCESS_FAILED", "message": "处理失败"}
            })))
        }
    }
}

/// "12.34" 这类金额串转分，格式异常返回 None
fn parse_decimal_cents(value: &str) -> Option<i64> {
    let mut parts = value.splitn(2, '.');
    let yuan: i64 = parts.next()?.parse().ok()?;
    let cents = match parts.next() {
        Some(frac) => {
            if frac.len() > 2 || frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let mut frac_value: i64 = frac.parse().ok()?;
            if frac.len() == 1 {
                frac_value *= 10;
            }
            frac_value
        }
        None => 0,
    };
    if yuan < 0 {
        return None;
    }
    Some(yuan * 100 + cents)
}

/// 配置webhook路由
pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhook")
            .route("/alipay", web::post().to(alipay_webhook))
            .route("/wechat", web::post().to(wechat_webhook))
            .route("/paypal", web::post().to(paypal_webhook))
            .route("/mock", web::post().to(mock_webhook)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlipayConfig, PaymentConfig, PaypalConfig, WechatPayConfig};
    use crate::external::{AlipayService, PaypalService, WechatPayService};
    use crate::models::{CreateOrderRequest, OrderItemInput};
    use crate::services::{OrderService, SystemService};
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn make_service(pool: &SqlitePool) -> PaymentService {
        let payment_config = PaymentConfig {
            mock_enabled: true,
            mock_secret: "testsecret".to_string(),
            ..PaymentConfig::default()
        };
        PaymentService::new(
            pool.clone(),
            AlipayService::new(AlipayConfig::default()),
            WechatPayService::new(WechatPayConfig::default()),
            PaypalService::new(PaypalConfig::default()),
            payment_config,
            SystemService::new(pool.clone()),
        )
    }

    async fn response_json(resp: HttpResponse) -> serde_json::Value {
        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_mock_webhook_failed_processing_allows_retry() {
        let pool = setup_pool().await;
        let svc = web::Data::new(make_service(&pool));

        let payment_no = "P20250901000000deadbeef".to_string();
        let sign = format!("{:x}", md5::compute(format!("{payment_no}testsecret")));
        let notify = |payment_no: &str, sign: &str| {
            web::Json(MockNotifyRequest {
                payment_no: payment_no.to_string(),
                result: "success".to_string(),
                sign: sign.to_string(),
                amount: Some(9900),
            })
        };

        // 支付单尚不存在（通知早于落库到达），第一次处理失败
        let resp = mock_webhook(svc.clone(), notify(&payment_no, &sign))
            .await
            .unwrap();
        let body = response_json(resp).await;
        assert_eq!(body["success"], false);

        // 补齐支付单后渠道按原样重发，同一通知必须还能入账
        let user_id = sqlx::query(
            "INSERT INTO users (username, email, password_hash) VALUES ('alice', 'alice@test.local', 'x')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        let product_id = sqlx::query(
            "INSERT INTO products (title, price, status) VALUES ('课程', 9900, 'on_shelf')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        let detail = OrderService::new(pool.clone(), 30)
            .create_order(
                user_id,
                CreateOrderRequest {
                    items: Some(vec![OrderItemInput {
                        product_id,
                        quantity: Some(1),
                    }]),
                },
            )
            .await
            .unwrap();
        let order_id: i64 = sqlx::query_scalar("SELECT id FROM orders WHERE order_no = ?")
            .bind(&detail.order.order_no)
            .fetch_one(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO payments (payment_no, order_id, user_id, provider, amount) VALUES (?, ?, ?, 'mock', 9900)",
        )
        .bind(&payment_no)
        .bind(order_id)
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

        let resp = mock_webhook(svc.clone(), notify(&payment_no, &sign))
            .await
            .unwrap();
        let body = response_json(resp).await;
        assert_eq!(body["success"], true);

        let status: String = sqlx::query_scalar("SELECT status FROM payments WHERE payment_no = ?")
            .bind(&payment_no)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "succeeded");

        // 入账之后的重复通知走去重分支，直接应答成功
        let resp = mock_webhook(svc, notify(&payment_no, &sign)).await.unwrap();
        let body = response_json(resp).await;
        assert_eq!(body["success"], true);
    }

    #[test]
    fn test_parse_decimal_cents() {
        assert_eq!(parse_decimal_cents("12.34"), Some(1234));
        assert_eq!(parse_decimal_cents("12.3"), Some(1230));
        assert_eq!(parse_decimal_cents("12"), Some(1200));
        assert_eq!(parse_decimal_cents("0.05"), Some(5));
        assert_eq!(parse_decimal_cents("12.345"), None);
        assert_eq!(parse_decimal_cents("abc"), None);
        assert_eq!(parse_decimal_cents("-1.00"), None);
    }
}
