use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::generate_order_no;

#[derive(Clone)]
pub struct OrderService {
    pool: SqlitePool,
    order_expire_minutes: i64,
}

impl OrderService {
    pub fn new(pool: SqlitePool, order_expire_minutes: i64) -> Self {
        Self {
            pool,
            order_expire_minutes,
        }
    }

    /// 创建商品订单。传入条目时直接下单，否则从购物车结算。
    pub async fn create_order(
        &self,
        user_id: i64,
        request: CreateOrderRequest,
    ) -> AppResult<OrderDetailResponse> {
        let mut tx = self.pool.begin().await?;

        let (inputs, from_cart) = match request.items {
            Some(items) if !items.is_empty() => (items, false),
            _ => {
                let cart_items = sqlx::query_as::<_, CartItem>(
                    "SELECT * FROM cart_items WHERE user_id = ? ORDER BY id",
                )
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;

                if cart_items.is_empty() {
                    return Err(AppError::ValidationError("购物车为空".to_string()));
                }

                let inputs = cart_items
                    .into_iter()
                    .map(|c| OrderItemInput {
                        product_id: c.product_id,
                        quantity: Some(c.quantity),
                    })
                    .collect();
                (inputs, true)
            }
        };

        // 逐个以当前在售价格建立快照
        let mut total_amount: i64 = 0;
        let mut snapshot: Vec<(i64, String, i64, i64)> = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let quantity = input.quantity.unwrap_or(1);
            if quantity < 1 || quantity > 99 {
                return Err(AppError::ValidationError("数量必须在1-99之间".to_string()));
            }

            let product = sqlx::query_as::<_, Product>(
                "SELECT * FROM products WHERE id = ? AND status = 'on_shelf'",
            )
            .bind(input.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::ValidationError(format!("商品 {} 不存在或已下架", input.product_id))
            })?;

            total_amount += product.price * quantity;
            snapshot.push((product.id, product.title, product.price, quantity));
        }

        // 有效会员享受套餐折扣
        let discount_rate: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT p.discount_rate
            FROM memberships m
            JOIN membership_plans p ON p.id = m.plan_id
            WHERE m.user_id = ? AND m.status = 'active' AND m.expires_at > ?
            ORDER BY p.discount_rate ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(Utc::now().naive_utc())
        .fetch_optional(&mut *tx)
        .await?;

        let payable_amount = match discount_rate {
            Some(rate) if rate < 1000 => total_amount * rate / 1000,
            _ => total_amount,
        };
        let discount_amount = total_amount - payable_amount;

        let order_no = generate_order_no();
        let expires_at = (Utc::now() + Duration::minutes(self.order_expire_minutes)).naive_utc();

        let order_id = sqlx::query(
            r#"
            INSERT INTO orders (order_no, user_id, kind, total_amount, discount_amount, payable_amount, expires_at)
            VALUES (?, ?, 'product', ?, ?, ?, ?)
            "#,
        )
        .bind(&order_no)
        .bind(user_id)
        .bind(total_amount)
        .bind(discount_amount)
        .bind(payable_amount)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (product_id, title, price, quantity) in &snapshot {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, product_title, unit_price, quantity)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(order_id)
            .bind(product_id)
            .bind(title)
            .bind(price)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }

        if from_cart {
            sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_order(user_id, &order_no).await
    }

    /// 创建会员套餐订单
    pub async fn create_membership_order(
        &self,
        user_id: i64,
        plan_id: i64,
    ) -> AppResult<OrderDetailResponse> {
        let plan = sqlx::query_as::<_, MembershipPlan>(
            "SELECT * FROM membership_plans WHERE id = ? AND status = 'enabled'",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("会员套餐不存在或未开放".to_string()))?;

        let order_no = generate_order_no();
        let expires_at = (Utc::now() + Duration::minutes(self.order_expire_minutes)).naive_utc();

        sqlx::query(
            r#"
            INSERT INTO orders (order_no, user_id, kind, plan_id, total_amount, discount_amount, payable_amount, expires_at)
            VALUES (?, ?, 'membership', ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&order_no)
        .bind(user_id)
        .bind(plan.id)
        .bind(plan.price)
        .bind(plan.price)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        self.get_order(user_id, &order_no).await
    }

    pub async fn list_orders(
        &self,
        user_id: i64,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<OrderResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut where_sql = String::from("WHERE user_id = ?");
        if query.status.is_some() {
            where_sql.push_str(" AND status = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM orders {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);
        if let Some(status) = &query.status {
            count_query = count_query.bind(status.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql =
            format!("SELECT * FROM orders {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?");
        let mut list_query = sqlx::query_as::<_, Order>(&list_sql).bind(user_id);
        if let Some(status) = &query.status {
            list_query = list_query.bind(status.clone());
        }
        let orders = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = orders.into_iter().map(OrderResponse::from).collect();
        Ok(PaginatedResponse::new(items, &params, total))
    }

    pub async fn get_order(&self, user_id: i64, order_no: &str) -> AppResult<OrderDetailResponse> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE order_no = ? AND user_id = ?",
        )
        .bind(order_no)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("订单不存在".to_string()))?;

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = ? ORDER BY id",
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderDetailResponse {
            order: OrderResponse::from(order),
            items,
        })
    }

    /// 取消订单：仅 pending 可取消
    pub async fn cancel_order(&self, user_id: i64, order_no: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'cancelled', cancelled_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE order_no = ? AND user_id = ? AND status = 'pending'
            "#,
        )
        .bind(order_no)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ValidationError(
                "订单不存在或当前状态不可取消".to_string(),
            ));
        }
        Ok(())
    }

    /// 后台订单列表（全量）
    pub async fn admin_list_orders(
        &self,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<Order>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut where_sql = String::from("WHERE 1=1");
        if query.status.is_some() {
            where_sql.push_str(" AND status = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM orders {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(status) = &query.status {
            count_query = count_query.bind(status.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql =
            format!("SELECT * FROM orders {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?");
        let mut list_query = sqlx::query_as::<_, Order>(&list_sql);
        if let Some(status) = &query.status {
            list_query = list_query.bind(status.clone());
        }
        let orders = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(orders, &params, total))
    }

    /// 过期未支付订单（后台任务调用）
    pub async fn expire_pending_orders(&self) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'expired', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at < ?
            "#,
        )
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    async fn seed_user(pool: &SqlitePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'x')")
            .bind(username)
            .bind(format!("{username}@test.local"))
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    async fn seed_product(pool: &SqlitePool, title: &str, price: i64) -> i64 {
        sqlx::query("INSERT INTO products (title, price, status) VALUES (?, ?, 'on_shelf')")
            .bind(title)
            .bind(price)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    fn items(entries: &[(i64, i64)]) -> CreateOrderRequest {
        CreateOrderRequest {
            items: Some(
                entries
                    .iter()
                    .map(|&(product_id, quantity)| OrderItemInput {
                        product_id,
                        quantity: Some(quantity),
                    })
                    .collect(),
            ),
        }
    }

    #[tokio::test]
    async fn test_create_order_snapshots_prices() {
        let pool = setup_pool().await;
        let svc = OrderService::new(pool.clone(), 30);
        let user_id = seed_user(&pool, "alice").await;
        let p1 = seed_product(&pool, "Rust 实战课", 9900).await;
        let p2 = seed_product(&pool, "算法电子书", 2900).await;

        let detail = svc
            .create_order(user_id, items(&[(p1, 1), (p2, 2)]))
            .await
            .unwrap();

        assert_eq!(detail.order.total_amount, 9900 + 2900 * 2);
        assert_eq!(detail.order.discount_amount, 0);
        assert_eq!(detail.order.payable_amount, detail.order.total_amount);
        assert_eq!(detail.order.status, OrderStatus::Pending);
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.items[0].product_title, "Rust 实战课");
        assert_eq!(detail.items[1].quantity, 2);
    }

    #[tokio::test]
    async fn test_create_order_applies_member_discount() {
        let pool = setup_pool().await;
        let svc = OrderService::new(pool.clone(), 30);
        let user_id = seed_user(&pool, "bob").await;
        let product_id = seed_product(&pool, "专栏", 10000).await;

        let plan_id = sqlx::query(
            "INSERT INTO membership_plans (name, duration_days, price, discount_rate) VALUES ('年卡', 365, 19900, 900)",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query(
            "INSERT INTO memberships (user_id, plan_id, started_at, expires_at, status) VALUES (?, ?, ?, ?, 'active')",
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(Utc::now().naive_utc())
        .bind((Utc::now() + Duration::days(30)).naive_utc())
        .execute(&pool)
        .await
        .unwrap();

        let detail = svc
            .create_order(user_id, items(&[(product_id, 1)]))
            .await
            .unwrap();

        assert_eq!(detail.order.total_amount, 10000);
        assert_eq!(detail.order.payable_amount, 9000);
        assert_eq!(detail.order.discount_amount, 1000);
    }

    #[tokio::test]
    async fn test_expired_membership_gets_no_discount() {
        let pool = setup_pool().await;
        let svc = OrderService::new(pool.clone(), 30);
        let user_id = seed_user(&pool, "carol").await;
        let product_id = seed_product(&pool, "课程", 5000).await;

        let plan_id = sqlx::query(
            "INSERT INTO membership_plans (name, duration_days, price, discount_rate) VALUES ('月卡', 30, 2900, 900)",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query(
            "INSERT INTO memberships (user_id, plan_id, started_at, expires_at, status) VALUES (?, ?, ?, ?, 'active')",
        )
        .bind(user_id)
        .bind(plan_id)
        .bind((Utc::now() - Duration::days(60)).naive_utc())
        .bind((Utc::now() - Duration::days(30)).naive_utc())
        .execute(&pool)
        .await
        .unwrap();

        let detail = svc
            .create_order(user_id, items(&[(product_id, 1)]))
            .await
            .unwrap();
        assert_eq!(detail.order.payable_amount, 5000);
    }

    #[tokio::test]
    async fn test_create_order_rejects_off_shelf_product() {
        let pool = setup_pool().await;
        let svc = OrderService::new(pool.clone(), 30);
        let user_id = seed_user(&pool, "dave").await;
        let product_id = sqlx::query(
            "INSERT INTO products (title, price, status) VALUES ('下架商品', 100, 'off_shelf')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let result = svc.create_order(user_id, items(&[(product_id, 1)])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_order_from_cart_clears_cart() {
        let pool = setup_pool().await;
        let svc = OrderService::new(pool.clone(), 30);
        let user_id = seed_user(&pool, "erin").await;
        let product_id = seed_product(&pool, "课程", 3000).await;
        sqlx::query("INSERT INTO cart_items (user_id, product_id, quantity) VALUES (?, ?, 2)")
            .bind(user_id)
            .bind(product_id)
            .execute(&pool)
            .await
            .unwrap();

        let detail = svc
            .create_order(user_id, CreateOrderRequest { items: None })
            .await
            .unwrap();
        assert_eq!(detail.order.total_amount, 6000);

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_cancel_order_only_when_pending() {
        let pool = setup_pool().await;
        let svc = OrderService::new(pool.clone(), 30);
        let user_id = seed_user(&pool, "frank").await;
        let product_id = seed_product(&pool, "课程", 1000).await;

        let detail = svc
            .create_order(user_id, items(&[(product_id, 1)]))
            .await
            .unwrap();
        let order_no = detail.order.order_no.clone();

        svc.cancel_order(user_id, &order_no).await.unwrap();
        let detail = svc.get_order(user_id, &order_no).await.unwrap();
        assert_eq!(detail.order.status, OrderStatus::Cancelled);

        // 终态不可再次取消
        assert!(svc.cancel_order(user_id, &order_no).await.is_err());
    }

    #[tokio::test]
    async fn test_expire_pending_orders() {
        let pool = setup_pool().await;
        let svc = OrderService::new(pool.clone(), 30);
        let user_id = seed_user(&pool, "grace").await;
        let product_id = seed_product(&pool, "课程", 1000).await;

        let stale = svc
            .create_order(user_id, items(&[(product_id, 1)]))
            .await
            .unwrap();
        let fresh = svc
            .create_order(user_id, items(&[(product_id, 1)]))
            .await
            .unwrap();
        sqlx::query("UPDATE orders SET expires_at = ? WHERE order_no = ?")
            .bind((Utc::now() - Duration::minutes(1)).naive_utc())
            .bind(&stale.order.order_no)
            .execute(&pool)
            .await
            .unwrap();

        let expired = svc.expire_pending_orders().await.unwrap();
        assert_eq!(expired, 1);

        let stale = svc.get_order(user_id, &stale.order.order_no).await.unwrap();
        let fresh = svc.get_order(user_id, &fresh.order.order_no).await.unwrap();
        assert_eq!(stale.order.status, OrderStatus::Expired);
        assert_eq!(fresh.order.status, OrderStatus::Pending);
    }
}
