use chrono::{Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::generate_invite_code;

#[derive(Clone)]
pub struct DistributionService {
    pool: SqlitePool,
    /// 佣金冻结期（天），期满后后台任务结算
    commission_hold_days: i64,
}

impl DistributionService {
    pub fn new(pool: SqlitePool, commission_hold_days: i64) -> Self {
        Self {
            pool,
            commission_hold_days,
        }
    }

    /// 申请成为分销员，待后台审核
    pub async fn apply(&self, user_id: i64) -> AppResult<DistributorResponse> {
        let existing = sqlx::query_as::<_, Distributor>(
            "SELECT * FROM distributors WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Err(AppError::ValidationError("您已提交过分销申请".to_string()));
        }

        // 邀请码唯一，撞码时重试
        let mut distributor_id = 0i64;
        for _ in 0..5 {
            let invite_code = generate_invite_code();
            let result = sqlx::query(
                "INSERT OR IGNORE INTO distributors (user_id, invite_code) VALUES (?, ?)",
            )
            .bind(user_id)
            .bind(&invite_code)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                distributor_id = result.last_insert_rowid();
                break;
            }
        }

        if distributor_id == 0 {
            return Err(AppError::InternalError("生成邀请码失败".to_string()));
        }

        let distributor =
            sqlx::query_as::<_, Distributor>("SELECT * FROM distributors WHERE id = ?")
                .bind(distributor_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(distributor.into())
    }

    pub async fn get_my_distributor(&self, user_id: i64) -> AppResult<DistributorResponse> {
        let distributor = self.find_by_user(user_id).await?;
        Ok(distributor.into())
    }

    pub async fn get_my_stats(&self, user_id: i64) -> AppResult<DistributorStats> {
        let distributor = self.find_by_user(user_id).await?;

        let referred_users: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE referrer_distributor_id = ?")
                .bind(distributor.id)
                .fetch_one(&self.pool)
                .await?;

        let total_orders: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM distribution_orders WHERE distributor_id = ? AND status != 'cancelled'",
        )
        .bind(distributor.id)
        .fetch_one(&self.pool)
        .await?;

        let pending_commission: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(commission_amount), 0) FROM distribution_orders
            WHERE distributor_id = ? AND status = 'pending'
            "#,
        )
        .bind(distributor.id)
        .fetch_one(&self.pool)
        .await?;

        let settled_commission: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(commission_amount), 0) FROM distribution_orders
            WHERE distributor_id = ? AND status = 'settled'
            "#,
        )
        .bind(distributor.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(DistributorStats {
            referred_users,
            total_orders,
            pending_commission,
            settled_commission,
            available_balance: distributor.available_balance,
        })
    }

    pub async fn list_my_commissions(
        &self,
        user_id: i64,
        query: &CommissionQuery,
    ) -> AppResult<PaginatedResponse<DistributionOrder>> {
        let distributor = self.find_by_user(user_id).await?;
        let params = PaginationParams::new(query.page, query.per_page);

        let mut where_sql = String::from("WHERE distributor_id = ?");
        if query.status.is_some() {
            where_sql.push_str(" AND status = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM distribution_orders {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(distributor.id);
        if let Some(status) = &query.status {
            count_query = count_query.bind(status.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM distribution_orders {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        let mut list_query =
            sqlx::query_as::<_, DistributionOrder>(&list_sql).bind(distributor.id);
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

    pub async fn list_my_withdrawals(
        &self,
        user_id: i64,
    ) -> AppResult<Vec<CommissionWithdrawal>> {
        let distributor = self.find_by_user(user_id).await?;
        let withdrawals = sqlx::query_as::<_, CommissionWithdrawal>(
            "SELECT * FROM commission_withdrawals WHERE distributor_id = ? ORDER BY id DESC",
        )
        .bind(distributor.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(withdrawals)
    }

    /// 申请提现。余额在审批通过时才扣减，这里只校验不超过可用余额。
    pub async fn create_withdrawal(
        &self,
        user_id: i64,
        request: CreateWithdrawalRequest,
    ) -> AppResult<CommissionWithdrawal> {
        if request.amount <= 0 {
            return Err(AppError::ValidationError("提现金额必须大于0".to_string()));
        }
        if request.account_info.trim().is_empty() {
            return Err(AppError::ValidationError("收款账户信息不能为空".to_string()));
        }

        let distributor = self.find_by_user(user_id).await?;
        if distributor.status != DistributorStatus::Approved {
            return Err(AppError::PermissionDenied("分销资格未通过审核".to_string()));
        }

        // 未处理的提现也占用余额
        let pending_amount: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM commission_withdrawals
            WHERE distributor_id = ? AND status = 'pending'
            "#,
        )
        .bind(distributor.id)
        .fetch_one(&self.pool)
        .await?;

        if request.amount + pending_amount > distributor.available_balance {
            return Err(AppError::ValidationError("可提现余额不足".to_string()));
        }

        let withdrawal_id = sqlx::query(
            "INSERT INTO commission_withdrawals (distributor_id, amount, account_info) VALUES (?, ?, ?)",
        )
        .bind(distributor.id)
        .bind(request.amount)
        .bind(request.account_info.trim())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let withdrawal = sqlx::query_as::<_, CommissionWithdrawal>(
            "SELECT * FROM commission_withdrawals WHERE id = ?",
        )
        .bind(withdrawal_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(withdrawal)
    }

    /// 订单支付成功后记录佣金（支付回调同事务内调用）。
    ///
    /// 买家的推荐人必须是已审核的分销员，且不能是买家自己。
    pub async fn create_commission_for_order(
        conn: &mut SqliteConnection,
        order: &Order,
    ) -> AppResult<Option<i64>> {
        let referrer_id: Option<i64> = sqlx::query_scalar(
            "SELECT referrer_distributor_id FROM users WHERE id = ?",
        )
        .bind(order.user_id)
        .fetch_one(&mut *conn)
        .await?;

        let distributor_id = match referrer_id {
            Some(id) => id,
            None => return Ok(None),
        };

        let distributor = sqlx::query_as::<_, Distributor>(
            "SELECT * FROM distributors WHERE id = ? AND status = 'approved'",
        )
        .bind(distributor_id)
        .fetch_optional(&mut *conn)
        .await?;

        let distributor = match distributor {
            Some(d) => d,
            None => return Ok(None),
        };

        // 自购不产生佣金
        if distributor.user_id == order.user_id {
            return Ok(None);
        }

        // 千分比向下取整
        let commission_amount = order.payable_amount * distributor.commission_rate / 1000;
        if commission_amount <= 0 {
            return Ok(None);
        }

        // order_id 唯一约束保证一单只记一笔
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO distribution_orders
                (distributor_id, order_id, buyer_id, order_amount, commission_rate, commission_amount)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(distributor.id)
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.payable_amount)
        .bind(distributor.commission_rate)
        .bind(commission_amount)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(commission_amount))
    }

    /// 结算冻结期已满的佣金（后台任务调用）
    pub async fn settle_due_commissions(&self) -> AppResult<u64> {
        let cutoff = Utc::now().naive_utc() - Duration::days(self.commission_hold_days);

        let due = sqlx::query_as::<_, DistributionOrder>(
            "SELECT * FROM distribution_orders WHERE status = 'pending' AND created_at <= ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut settled = 0u64;
        for order in due {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                r#"
                UPDATE distribution_orders
                SET status = 'settled', settled_at = CURRENT_TIMESTAMP
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                continue;
            }

            sqlx::query(
                r#"
                UPDATE distributors
                SET total_commission = total_commission + ?,
                    available_balance = available_balance + ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(order.commission_amount)
            .bind(order.commission_amount)
            .bind(order.distributor_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            settled += 1;
        }

        Ok(settled)
    }

    // ---------- 后台 ----------

    pub async fn admin_list_distributors(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
        status: Option<DistributorStatus>,
    ) -> AppResult<PaginatedResponse<Distributor>> {
        let params = PaginationParams::new(page, per_page);

        let mut where_sql = String::from("WHERE 1=1");
        if status.is_some() {
            where_sql.push_str(" AND status = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM distributors {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(s) = &status {
            count_query = count_query.bind(s.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql =
            format!("SELECT * FROM distributors {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?");
        let mut list_query = sqlx::query_as::<_, Distributor>(&list_sql);
        if let Some(s) = &status {
            list_query = list_query.bind(s.clone());
        }
        let distributors = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(distributors, &params, total))
    }

    pub async fn admin_update_distributor(
        &self,
        distributor_id: i64,
        request: UpdateDistributorRequest,
    ) -> AppResult<Distributor> {
        let distributor =
            sqlx::query_as::<_, Distributor>("SELECT * FROM distributors WHERE id = ?")
                .bind(distributor_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound("分销员不存在".to_string()))?;

        let commission_rate = request.commission_rate.unwrap_or(distributor.commission_rate);
        if !(0..=1000).contains(&commission_rate) {
            return Err(AppError::ValidationError(
                "佣金比例必须在0-1000（千分比）之间".to_string(),
            ));
        }

        sqlx::query(
            r#"
            UPDATE distributors
            SET commission_rate = ?, status = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(commission_rate)
        .bind(request.status.unwrap_or(distributor.status))
        .bind(distributor_id)
        .execute(&self.pool)
        .await?;

        let distributor =
            sqlx::query_as::<_, Distributor>("SELECT * FROM distributors WHERE id = ?")
                .bind(distributor_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(distributor)
    }

    pub async fn admin_list_withdrawals(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
        status: Option<WithdrawalStatus>,
    ) -> AppResult<PaginatedResponse<CommissionWithdrawal>> {
        let params = PaginationParams::new(page, per_page);

        let mut where_sql = String::from("WHERE 1=1");
        if status.is_some() {
            where_sql.push_str(" AND status = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM commission_withdrawals {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(s) = &status {
            count_query = count_query.bind(s.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM commission_withdrawals {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query_as::<_, CommissionWithdrawal>(&list_sql);
        if let Some(s) = &status {
            list_query = list_query.bind(s.clone());
        }
        let withdrawals = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(withdrawals, &params, total))
    }

    /// 审核提现。通过时在同一事务内条件扣减余额，余额不足则整单失败。
    pub async fn review_withdrawal(
        &self,
        withdrawal_id: i64,
        admin_id: i64,
        request: ReviewWithdrawalRequest,
    ) -> AppResult<CommissionWithdrawal> {
        let mut tx = self.pool.begin().await?;

        let withdrawal = sqlx::query_as::<_, CommissionWithdrawal>(
            "SELECT * FROM commission_withdrawals WHERE id = ?",
        )
        .bind(withdrawal_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("提现申请不存在".to_string()))?;

        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(AppError::ValidationError("提现申请已处理".to_string()));
        }

        let new_status = if request.approve {
            let result = sqlx::query(
                r#"
                UPDATE distributors
                SET available_balance = available_balance - ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ? AND available_balance >= ?
                "#,
            )
            .bind(withdrawal.amount)
            .bind(withdrawal.distributor_id)
            .bind(withdrawal.amount)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::ValidationError(
                    "分销员余额不足，无法通过提现".to_string(),
                ));
            }
            WithdrawalStatus::Approved
        } else {
            WithdrawalStatus::Rejected
        };

        sqlx::query(
            r#"
            UPDATE commission_withdrawals
            SET status = ?, reviewed_by = ?, reviewed_at = CURRENT_TIMESTAMP, remark = ?
            WHERE id = ?
            "#,
        )
        .bind(new_status)
        .bind(admin_id)
        .bind(&request.remark)
        .bind(withdrawal_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let withdrawal = sqlx::query_as::<_, CommissionWithdrawal>(
            "SELECT * FROM commission_withdrawals WHERE id = ?",
        )
        .bind(withdrawal_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(withdrawal)
    }

    async fn find_by_user(&self, user_id: i64) -> AppResult<Distributor> {
        sqlx::query_as::<_, Distributor>("SELECT * FROM distributors WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("您还不是分销员".to_string()))
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

    async fn seed_distributor(
        pool: &SqlitePool,
        user_id: i64,
        invite_code: &str,
        balance: i64,
    ) -> i64 {
        sqlx::query(
            r#"
            INSERT INTO distributors (user_id, invite_code, commission_rate, available_balance, status)
            VALUES (?, ?, 100, ?, 'approved')
            "#,
        )
        .bind(user_id)
        .bind(invite_code)
        .bind(balance)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn seed_paid_order(pool: &SqlitePool, user_id: i64, payable: i64) -> Order {
        let order_no = format!("T{user_id}{payable}");
        sqlx::query(
            r#"
            INSERT INTO orders (order_no, user_id, kind, total_amount, discount_amount, payable_amount, status)
            VALUES (?, ?, 'product', ?, 0, ?, 'paid')
            "#,
        )
        .bind(&order_no)
        .bind(user_id)
        .bind(payable)
        .bind(payable)
        .execute(pool)
        .await
        .unwrap();
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_no = ?")
            .bind(&order_no)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_rejects_duplicate() {
        let pool = setup_pool().await;
        let svc = DistributionService::new(pool.clone(), 7);
        let user_id = seed_user(&pool, "alice").await;

        let distributor = svc.apply(user_id).await.unwrap();
        assert_eq!(distributor.status, DistributorStatus::Pending);
        assert!(svc.apply(user_id).await.is_err());
    }

    #[tokio::test]
    async fn test_commission_uses_floor_division() {
        let pool = setup_pool().await;
        let referrer = seed_user(&pool, "referrer").await;
        let distributor_id = seed_distributor(&pool, referrer, "INV1", 0).await;
        let buyer = seed_user(&pool, "buyer").await;
        sqlx::query("UPDATE users SET referrer_distributor_id = ? WHERE id = ?")
            .bind(distributor_id)
            .bind(buyer)
            .execute(&pool)
            .await
            .unwrap();

        let order = seed_paid_order(&pool, buyer, 999).await;
        let mut conn = pool.acquire().await.unwrap();
        let commission = DistributionService::create_commission_for_order(&mut conn, &order)
            .await
            .unwrap();
        // 999 * 100 / 1000 向下取整
        assert_eq!(commission, Some(99));

        // 同一订单不重复记佣
        let again = DistributionService::create_commission_for_order(&mut conn, &order)
            .await
            .unwrap();
        assert_eq!(again, None);
    }

    #[tokio::test]
    async fn test_self_purchase_earns_no_commission() {
        let pool = setup_pool().await;
        let user_id = seed_user(&pool, "selfbuyer").await;
        let distributor_id = seed_distributor(&pool, user_id, "INV1", 0).await;
        sqlx::query("UPDATE users SET referrer_distributor_id = ? WHERE id = ?")
            .bind(distributor_id)
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();

        let order = seed_paid_order(&pool, user_id, 10000).await;
        let mut conn = pool.acquire().await.unwrap();
        let commission = DistributionService::create_commission_for_order(&mut conn, &order)
            .await
            .unwrap();
        assert_eq!(commission, None);
    }

    #[tokio::test]
    async fn test_unapproved_referrer_earns_no_commission() {
        let pool = setup_pool().await;
        let referrer = seed_user(&pool, "referrer").await;
        let distributor_id = sqlx::query(
            "INSERT INTO distributors (user_id, invite_code, status) VALUES (?, 'INV1', 'pending')",
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

        let order = seed_paid_order(&pool, buyer, 10000).await;
        let mut conn = pool.acquire().await.unwrap();
        let commission = DistributionService::create_commission_for_order(&mut conn, &order)
            .await
            .unwrap();
        assert_eq!(commission, None);
    }

    #[tokio::test]
    async fn test_settle_due_commissions_after_hold_window() {
        let pool = setup_pool().await;
        let svc = DistributionService::new(pool.clone(), 7);
        let referrer = seed_user(&pool, "referrer").await;
        let distributor_id = seed_distributor(&pool, referrer, "INV1", 0).await;
        let buyer = seed_user(&pool, "buyer").await;
        let order = seed_paid_order(&pool, buyer, 10000).await;

        // 一笔已出冻结期，一笔还在冻结期内
        sqlx::query(
            r#"
            INSERT INTO distribution_orders
                (distributor_id, order_id, buyer_id, order_amount, commission_rate, commission_amount, created_at)
            VALUES (?, ?, ?, 10000, 100, 1000, ?)
            "#,
        )
        .bind(distributor_id)
        .bind(order.id)
        .bind(buyer)
        .bind((Utc::now() - Duration::days(8)).naive_utc())
        .execute(&pool)
        .await
        .unwrap();
        let fresh_order = seed_paid_order(&pool, buyer, 5000).await;
        sqlx::query(
            r#"
            INSERT INTO distribution_orders
                (distributor_id, order_id, buyer_id, order_amount, commission_rate, commission_amount)
            VALUES (?, ?, ?, 5000, 100, 500)
            "#,
        )
        .bind(distributor_id)
        .bind(fresh_order.id)
        .bind(buyer)
        .execute(&pool)
        .await
        .unwrap();

        let settled = svc.settle_due_commissions().await.unwrap();
        assert_eq!(settled, 1);

        let stats = svc.get_my_stats(referrer).await.unwrap();
        assert_eq!(stats.settled_commission, 1000);
        assert_eq!(stats.pending_commission, 500);
        assert_eq!(stats.available_balance, 1000);

        // 重复结算不产生新入账
        assert_eq!(svc.settle_due_commissions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_withdrawal_balance_occupied_by_pending() {
        let pool = setup_pool().await;
        let svc = DistributionService::new(pool.clone(), 7);
        let user_id = seed_user(&pool, "alice").await;
        seed_distributor(&pool, user_id, "INV1", 1000).await;

        let request = |amount: i64| CreateWithdrawalRequest {
            amount,
            account_info: "alipay:alice@test.local".to_string(),
        };
        svc.create_withdrawal(user_id, request(600)).await.unwrap();
        // 待审核的 600 占用余额，再提 600 超出
        assert!(svc.create_withdrawal(user_id, request(600)).await.is_err());
        svc.create_withdrawal(user_id, request(400)).await.unwrap();
    }

    #[tokio::test]
    async fn test_review_withdrawal_approve_deducts_balance() {
        let pool = setup_pool().await;
        let svc = DistributionService::new(pool.clone(), 7);
        let user_id = seed_user(&pool, "alice").await;
        let admin_id = seed_user(&pool, "admin").await;
        let distributor_id = seed_distributor(&pool, user_id, "INV1", 1000).await;

        let withdrawal = svc
            .create_withdrawal(
                user_id,
                CreateWithdrawalRequest {
                    amount: 600,
                    account_info: "bank:123".to_string(),
                },
            )
            .await
            .unwrap();

        let reviewed = svc
            .review_withdrawal(
                withdrawal.id,
                admin_id,
                ReviewWithdrawalRequest {
                    approve: true,
                    remark: Some("已打款".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(reviewed.status, WithdrawalStatus::Approved);

        let balance: i64 =
            sqlx::query_scalar("SELECT available_balance FROM distributors WHERE id = ?")
                .bind(distributor_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(balance, 400);

        // 已处理的申请不可再审
        assert!(svc
            .review_withdrawal(
                withdrawal.id,
                admin_id,
                ReviewWithdrawalRequest {
                    approve: false,
                    remark: None,
                },
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_review_withdrawal_insufficient_balance_fails() {
        let pool = setup_pool().await;
        let svc = DistributionService::new(pool.clone(), 7);
        let user_id = seed_user(&pool, "alice").await;
        let admin_id = seed_user(&pool, "admin").await;
        let distributor_id = seed_distributor(&pool, user_id, "INV1", 1000).await;

        let withdrawal = svc
            .create_withdrawal(
                user_id,
                CreateWithdrawalRequest {
                    amount: 800,
                    account_info: "bank:123".to_string(),
                },
            )
            .await
            .unwrap();

        // 审核前余额被其他途径扣减
        sqlx::query("UPDATE distributors SET available_balance = 500 WHERE id = ?")
            .bind(distributor_id)
            .execute(&pool)
            .await
            .unwrap();

        let result = svc
            .review_withdrawal(
                withdrawal.id,
                admin_id,
                ReviewWithdrawalRequest {
                    approve: true,
                    remark: None,
                },
            )
            .await;
        assert!(result.is_err());

        // 整单回滚，余额与申请状态均不变
        let balance: i64 =
            sqlx::query_scalar("SELECT available_balance FROM distributors WHERE id = ?")
                .bind(distributor_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(balance, 500);
        let status: String =
            sqlx::query_scalar("SELECT status FROM commission_withdrawals WHERE id = ?")
                .bind(withdrawal.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "pending");
    }

    #[tokio::test]
    async fn test_reject_withdrawal_keeps_balance() {
        let pool = setup_pool().await;
        let svc = DistributionService::new(pool.clone(), 7);
        let user_id = seed_user(&pool, "alice").await;
        let admin_id = seed_user(&pool, "admin").await;
        let distributor_id = seed_distributor(&pool, user_id, "INV1", 1000).await;

        let withdrawal = svc
            .create_withdrawal(
                user_id,
                CreateWithdrawalRequest {
                    amount: 600,
                    account_info: "bank:123".to_string(),
                },
            )
            .await
            .unwrap();
        let reviewed = svc
            .review_withdrawal(
                withdrawal.id,
                admin_id,
                ReviewWithdrawalRequest {
                    approve: false,
                    remark: Some("账户信息有误".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(reviewed.status, WithdrawalStatus::Rejected);

        let balance: i64 =
            sqlx::query_scalar("SELECT available_balance FROM distributors WHERE id = ?")
                .bind(distributor_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(balance, 1000);
    }
}
