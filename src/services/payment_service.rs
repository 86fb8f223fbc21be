use chrono::Utc;
use sqlx::SqlitePool;

use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};
use crate::external::{AlipayService, PaypalService, WechatPayService};
use crate::models::*;
use crate::services::{DistributionService, MembershipService, SystemService};
use crate::utils::{generate_payment_no, DedupCache};

/// 支付单据与回调处理。渠道差异收敛在 create_payment 的分支里，
/// 成功回调统一走 handle_success。
#[derive(Clone)]
pub struct PaymentService {
    pool: SqlitePool,
    alipay: AlipayService,
    wechat: WechatPayService,
    paypal: PaypalService,
    payment_config: PaymentConfig,
    system_service: SystemService,
    // 短时间重复到达的回调直接吞掉
    notify_dedup: DedupCache,
}

impl PaymentService {
    pub fn new(
        pool: SqlitePool,
        alipay: AlipayService,
        wechat: WechatPayService,
        paypal: PaypalService,
        payment_config: PaymentConfig,
        system_service: SystemService,
    ) -> Self {
        Self {
            pool,
            alipay,
            wechat,
            paypal,
            payment_config,
            system_service,
            notify_dedup: DedupCache::new(4096, std::time::Duration::from_secs(300)),
        }
    }

    pub fn alipay(&self) -> &AlipayService {
        &self.alipay
    }

    pub fn wechat(&self) -> &WechatPayService {
        &self.wechat
    }

    pub fn paypal(&self) -> &PaypalService {
        &self.paypal
    }

    /// 对待支付订单发起支付，返回收银台信息
    pub async fn create_payment(
        &self,
        user_id: i64,
        request: CreatePaymentRequest,
    ) -> AppResult<CreatePaymentResponse> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE order_no = ? AND user_id = ?",
        )
        .bind(&request.order_no)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("订单不存在".to_string()))?;

        if order.status != OrderStatus::Pending {
            return Err(AppError::ValidationError("订单不是待支付状态".to_string()));
        }
        if let Some(expires_at) = order.expires_at {
            if expires_at <= Utc::now().naive_utc() {
                return Err(AppError::ValidationError("订单已过期，请重新下单".to_string()));
            }
        }

        if request.provider == PaymentProvider::Mock && !self.payment_config.mock_enabled {
            return Err(AppError::ValidationError("不支持的支付渠道".to_string()));
        }

        let payment_no = generate_payment_no();
        let subject = match order.kind {
            OrderKind::Membership => "会员套餐".to_string(),
            OrderKind::Product => format!("订单{}", order.order_no),
        };

        let mut pay_url: Option<String> = None;
        let mut pay_params: Option<serde_json::Value> = None;
        let mut provider_txn_id: Option<String> = None;

        match request.provider {
            PaymentProvider::Alipay => {
                pay_url =
                    Some(self.alipay.build_pay_url(&payment_no, &subject, order.payable_amount)?);
            }
            PaymentProvider::Wechat => {
                pay_params = Some(self.wechat.build_prepay_params(
                    &payment_no,
                    &subject,
                    order.payable_amount,
                )?);
            }
            PaymentProvider::Paypal => {
                let (paypal_order_id, approve_url) = self
                    .paypal
                    .create_order(&payment_no, order.payable_amount)
                    .await?;
                provider_txn_id = Some(paypal_order_id);
                pay_url = approve_url;
            }
            PaymentProvider::Mock => {
                pay_url = Some(format!("mock://pay/{payment_no}"));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO payments (payment_no, order_id, user_id, provider, amount, provider_txn_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment_no)
        .bind(order.id)
        .bind(user_id)
        .bind(request.provider)
        .bind(order.payable_amount)
        .bind(&provider_txn_id)
        .execute(&self.pool)
        .await?;

        Ok(CreatePaymentResponse {
            payment_no,
            provider: request.provider,
            amount: order.payable_amount,
            pay_url,
            pay_params,
        })
    }

    pub async fn get_payment(&self, user_id: i64, payment_no: &str) -> AppResult<PaymentResponse> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE payment_no = ? AND user_id = ?",
        )
        .bind(payment_no)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("支付单不存在".to_string()))?;

        Ok(payment.into())
    }

    pub async fn find_by_provider_txn(&self, provider_txn_id: &str) -> AppResult<Option<Payment>> {
        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE provider_txn_id = ?")
                .bind(provider_txn_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(payment)
    }

    /// mock 回调签名：md5(payment_no + secret)
    pub fn verify_mock_sign(&self, payment_no: &str, sign: &str) -> bool {
        if !self.payment_config.mock_enabled || self.payment_config.mock_secret.is_empty() {
            return false;
        }
        let expected = format!(
            "{:x}",
            md5::compute(format!("{payment_no}{}", self.payment_config.mock_secret))
        );
        expected == sign.to_lowercase()
    }

    /// 同一笔回调短时间内只处理一次。
    /// 只有处理成功后调用 mark_notification 才记账，失败的通知允许渠道重试
    pub fn is_duplicate_notification(&self, key: &str) -> bool {
        self.notify_dedup.contains(key)
    }

    pub fn mark_notification(&self, key: &str) {
        self.notify_dedup.insert_new(key);
    }

    /// 支付成功回调。按 payment_no 幂等，重复通知直接返回成功。
    ///
    /// 金额不一致视为可疑通知：支付单标记失败并产生告警，订单不动。
    pub async fn handle_success(
        &self,
        payment_no: &str,
        provider_txn_id: Option<&str>,
        paid_amount: Option<i64>,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE payment_no = ?",
        )
        .bind(payment_no)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("支付单不存在".to_string()))?;

        if payment.status == PaymentStatus::Succeeded {
            log::info!("Duplicate success notification for payment {payment_no}, ignored");
            return Ok(());
        }

        if let Some(paid) = paid_amount {
            if paid != payment.amount {
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = 'failed', notified_at = CURRENT_TIMESTAMP,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = ?
                    "#,
                )
                .bind(payment.id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                self.system_service
                    .record_alert(
                        "amount_mismatch",
                        AlertLevel::Critical,
                        &format!(
                            "支付单{payment_no}通知金额{paid}与应付金额{}不一致",
                            payment.amount
                        ),
                        None,
                        Some(payment.user_id),
                    )
                    .await;
                return Err(AppError::ValidationError("支付金额不一致".to_string()));
            }
        }

        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(payment.order_id)
            .fetch_one(&mut *tx)
            .await?;

        match order.status {
            // 已过期但用户实际完成了扣款，照常入账
            OrderStatus::Pending | OrderStatus::Expired => {}
            OrderStatus::Paid => {
                // 订单已由另一笔支付完成，本支付单只记录通知
                log::warn!(
                    "Payment {payment_no} succeeded but order {} already paid",
                    order.order_no
                );
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = 'succeeded', provider_txn_id = COALESCE(?, provider_txn_id),
                        notified_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
                    WHERE id = ?
                    "#,
                )
                .bind(provider_txn_id)
                .bind(payment.id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                return Ok(());
            }
            OrderStatus::Cancelled => {
                tx.commit().await?;
                self.system_service
                    .record_alert(
                        "paid_after_cancel",
                        AlertLevel::Warning,
                        &format!("已取消订单{}收到支付成功通知{payment_no}", order.order_no),
                        None,
                        Some(payment.user_id),
                    )
                    .await;
                return Err(AppError::ValidationError("订单已取消".to_string()));
            }
        }

        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'succeeded', provider_txn_id = COALESCE(?, provider_txn_id),
                notified_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(provider_txn_id)
        .bind(payment.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'paid', paid_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(order.id)
        .execute(&mut *tx)
        .await?;

        match order.kind {
            OrderKind::Product => {
                // 商品销量累加
                let items = sqlx::query_as::<_, OrderItem>(
                    "SELECT * FROM order_items WHERE order_id = ?",
                )
                .bind(order.id)
                .fetch_all(&mut *tx)
                .await?;

                for item in &items {
                    sqlx::query(
                        "UPDATE products SET sales_count = sales_count + ? WHERE id = ?",
                    )
                    .bind(item.quantity)
                    .bind(item.product_id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            OrderKind::Membership => {
                let plan_id = order.plan_id.ok_or_else(|| {
                    AppError::InternalError(format!("会员订单{}缺少套餐", order.order_no))
                })?;
                MembershipService::activate_plan(&mut *tx, order.user_id, plan_id).await?;
                let code = MembershipService::issue_code(&mut *tx, plan_id).await?;
                log::info!(
                    "Order {} activated membership plan {plan_id}, bonus code {code}",
                    order.order_no
                );
            }
        }

        if let Some(commission) =
            DistributionService::create_commission_for_order(&mut *tx, &order).await?
        {
            log::info!(
                "Order {} generated commission {commission} cents",
                order.order_no
            );
        }

        tx.commit().await?;
        log::info!("Payment {payment_no} succeeded, order {} paid", order.order_no);
        Ok(())
    }

    /// 支付失败/取消回调，只更新支付单
    pub async fn handle_failure(&self, payment_no: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', notified_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE payment_no = ? AND status = 'pending'
            "#,
        )
        .bind(payment_no)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            log::info!("Payment {payment_no} marked as failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlipayConfig, PaypalConfig, WechatPayConfig};
    use crate::services::OrderService;
    use sqlx::sqlite::SqlitePoolOptions;

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

    async fn seed_user(pool: &SqlitePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'x')")
            .bind(username)
            .bind(format!("{username}@test.local"))
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    async fn seed_product(pool: &SqlitePool, price: i64) -> i64 {
        sqlx::query("INSERT INTO products (title, price, status) VALUES ('课程', ?, 'on_shelf')")
            .bind(price)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    async fn seed_product_order(pool: &SqlitePool, user_id: i64, product_id: i64) -> (i64, String, i64) {
        let order_svc = OrderService::new(pool.clone(), 30);
        let detail = order_svc
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
            .fetch_one(pool)
            .await
            .unwrap();
        (order_id, detail.order.order_no, detail.order.payable_amount)
    }

    async fn seed_payment(pool: &SqlitePool, order_id: i64, user_id: i64, amount: i64) -> String {
        let payment_no = generate_payment_no();
        sqlx::query(
            "INSERT INTO payments (payment_no, order_id, user_id, provider, amount) VALUES (?, ?, ?, 'mock', ?)",
        )
        .bind(&payment_no)
        .bind(order_id)
        .bind(user_id)
        .bind(amount)
        .execute(pool)
        .await
        .unwrap();
        payment_no
    }

    async fn order_status(pool: &SqlitePool, order_id: i64) -> String {
        sqlx::query_scalar("SELECT status FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_handle_success_marks_paid_and_counts_sales() {
        let pool = setup_pool().await;
        let svc = make_service(&pool);
        let user_id = seed_user(&pool, "alice").await;
        let product_id = seed_product(&pool, 5000).await;
        let (order_id, _, amount) = seed_product_order(&pool, user_id, product_id).await;
        let payment_no = seed_payment(&pool, order_id, user_id, amount).await;

        svc.handle_success(&payment_no, Some("txn-1"), Some(amount))
            .await
            .unwrap();

        assert_eq!(order_status(&pool, order_id).await, "paid");
        let payment = svc.get_payment(user_id, &payment_no).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        let sales: i64 = sqlx::query_scalar("SELECT sales_count FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(sales, 1);
    }

    #[tokio::test]
    async fn test_handle_success_is_idempotent() {
        let pool = setup_pool().await;
        let svc = make_service(&pool);
        let user_id = seed_user(&pool, "bob").await;
        let product_id = seed_product(&pool, 3000).await;
        let (order_id, _, amount) = seed_product_order(&pool, user_id, product_id).await;
        let payment_no = seed_payment(&pool, order_id, user_id, amount).await;

        svc.handle_success(&payment_no, Some("txn-1"), Some(amount))
            .await
            .unwrap();
        // 重复通知不报错也不重复入账
        svc.handle_success(&payment_no, Some("txn-1"), Some(amount))
            .await
            .unwrap();

        let sales: i64 = sqlx::query_scalar("SELECT sales_count FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(sales, 1);
    }

    #[tokio::test]
    async fn test_amount_mismatch_fails_payment_and_alerts() {
        let pool = setup_pool().await;
        let svc = make_service(&pool);
        let user_id = seed_user(&pool, "carol").await;
        let product_id = seed_product(&pool, 5000).await;
        let (order_id, _, amount) = seed_product_order(&pool, user_id, product_id).await;
        let payment_no = seed_payment(&pool, order_id, user_id, amount).await;

        let result = svc.handle_success(&payment_no, None, Some(amount - 100)).await;
        assert!(result.is_err());

        // 支付单标记失败，订单保持待支付
        let payment = svc.get_payment(user_id, &payment_no).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(order_status(&pool, order_id).await, "pending");

        let alerts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM security_alerts WHERE alert_type = 'amount_mismatch'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn test_paid_after_cancel_alerts() {
        let pool = setup_pool().await;
        let svc = make_service(&pool);
        let user_id = seed_user(&pool, "dave").await;
        let product_id = seed_product(&pool, 5000).await;
        let (order_id, order_no, amount) = seed_product_order(&pool, user_id, product_id).await;
        let payment_no = seed_payment(&pool, order_id, user_id, amount).await;

        OrderService::new(pool.clone(), 30)
            .cancel_order(user_id, &order_no)
            .await
            .unwrap();

        let result = svc.handle_success(&payment_no, None, Some(amount)).await;
        assert!(result.is_err());
        assert_eq!(order_status(&pool, order_id).await, "cancelled");

        let alerts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM security_alerts WHERE alert_type = 'paid_after_cancel'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn test_membership_order_activates_plan_and_issues_code() {
        let pool = setup_pool().await;
        let svc = make_service(&pool);
        let user_id = seed_user(&pool, "erin").await;
        let plan_id = sqlx::query(
            "INSERT INTO membership_plans (name, duration_days, price, discount_rate) VALUES ('月卡', 30, 2900, 950)",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let order_svc = OrderService::new(pool.clone(), 30);
        let detail = order_svc.create_membership_order(user_id, plan_id).await.unwrap();
        let order_id: i64 = sqlx::query_scalar("SELECT id FROM orders WHERE order_no = ?")
            .bind(&detail.order.order_no)
            .fetch_one(&pool)
            .await
            .unwrap();
        let payment_no = seed_payment(&pool, order_id, user_id, 2900).await;

        svc.handle_success(&payment_no, None, Some(2900)).await.unwrap();

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(active, 1);

        // 购买套餐附赠一个未使用的会员码
        let codes: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM membership_codes WHERE plan_id = ? AND status = 'unused'",
        )
        .bind(plan_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(codes, 1);
    }

    #[tokio::test]
    async fn test_commission_created_for_referred_buyer() {
        let pool = setup_pool().await;
        let svc = make_service(&pool);
        let referrer = seed_user(&pool, "referrer").await;
        let distributor_id = sqlx::query(
            "INSERT INTO distributors (user_id, invite_code, commission_rate, status) VALUES (?, 'INV1', 100, 'approved')",
        )
        .bind(referrer)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let buyer = seed_user(&pool, "buyer").await;
        sqlx::query("UPDATE users SET referrer_distributor_id = ? WHERE id = ?")
            .bind(distributor_id)
            .bind(buyer)
            .execute(&pool)
            .await
            .unwrap();

        let product_id = seed_product(&pool, 10000).await;
        let (order_id, _, amount) = seed_product_order(&pool, buyer, product_id).await;
        let payment_no = seed_payment(&pool, order_id, buyer, amount).await;

        svc.handle_success(&payment_no, None, Some(amount)).await.unwrap();

        let commission: i64 = sqlx::query_scalar(
            "SELECT commission_amount FROM distribution_orders WHERE order_id = ?",
        )
        .bind(order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(commission, 10000 * 100 / 1000);
    }

    #[tokio::test]
    async fn test_verify_mock_sign() {
        let pool = setup_pool().await;
        let svc = make_service(&pool);

        let sign = format!("{:x}", md5::compute("PAY123testsecret"));
        assert!(svc.verify_mock_sign("PAY123", &sign));
        assert!(svc.verify_mock_sign("PAY123", &sign.to_uppercase()));
        assert!(!svc.verify_mock_sign("PAY123", "deadbeef"));

        // mock 渠道关闭时一律拒签
        let disabled = PaymentService::new(
            pool.clone(),
            AlipayService::new(AlipayConfig::default()),
            WechatPayService::new(WechatPayConfig::default()),
            PaypalService::new(PaypalConfig::default()),
            PaymentConfig::default(),
            SystemService::new(pool.clone()),
        );
        assert!(!disabled.verify_mock_sign("PAY123", &sign));
    }
}
