use chrono::{Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::{generate_batch_no, generate_membership_code};

#[derive(Clone)]
pub struct MembershipService {
    pool: SqlitePool,
}

impl MembershipService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_plans(&self) -> AppResult<Vec<MembershipPlan>> {
        let plans = sqlx::query_as::<_, MembershipPlan>(
            "SELECT * FROM membership_plans WHERE status = 'enabled' ORDER BY price",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(plans)
    }

    pub async fn get_my_membership(&self, user_id: i64) -> AppResult<Option<MembershipResponse>> {
        let row = sqlx::query_as::<_, Membership>(
            r#"
            SELECT * FROM memberships
            WHERE user_id = ? AND status = 'active' AND expires_at > ?
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(Utc::now().naive_utc())
        .fetch_optional(&self.pool)
        .await?;

        let membership = match row {
            Some(m) => m,
            None => return Ok(None),
        };

        let plan = sqlx::query_as::<_, MembershipPlan>(
            "SELECT * FROM membership_plans WHERE id = ?",
        )
        .bind(membership.plan_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(MembershipResponse {
            plan_id: plan.id,
            plan_name: plan.name,
            discount_rate: plan.discount_rate,
            started_at: membership.started_at,
            expires_at: membership.expires_at,
            status: membership.status,
        }))
    }

    /// 兑换会员码：状态条件更新保证一个码只被消费一次
    pub async fn redeem_code(
        &self,
        user_id: i64,
        request: RedeemCodeRequest,
    ) -> AppResult<MembershipResponse> {
        let code = request.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(AppError::ValidationError("会员码不能为空".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE membership_codes
            SET status = 'used', used_by = ?, used_at = CURRENT_TIMESTAMP
            WHERE code = ? AND status = 'unused'
            "#,
        )
        .bind(user_id)
        .bind(&code)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ValidationError(
                "会员码无效或已被使用".to_string(),
            ));
        }

        let plan_id: i64 =
            sqlx::query_scalar("SELECT plan_id FROM membership_codes WHERE code = ?")
                .bind(&code)
                .fetch_one(&mut *tx)
                .await?;

        Self::activate_plan(&mut *tx, user_id, plan_id).await?;
        tx.commit().await?;

        self.get_my_membership(user_id)
            .await?
            .ok_or_else(|| AppError::InternalError("会员激活失败".to_string()))
    }

    /// 激活/续期会员。已有有效会员时在原到期日上顺延。
    ///
    /// 支付回调在同一事务内调用。
    pub async fn activate_plan(
        conn: &mut SqliteConnection,
        user_id: i64,
        plan_id: i64,
    ) -> AppResult<()> {
        let plan = sqlx::query_as::<_, MembershipPlan>(
            "SELECT * FROM membership_plans WHERE id = ?",
        )
        .bind(plan_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("会员套餐不存在".to_string()))?;

        let now = Utc::now().naive_utc();
        let current_expiry: Option<chrono::NaiveDateTime> = sqlx::query_scalar(
            r#"
            SELECT expires_at FROM memberships
            WHERE user_id = ? AND status = 'active' AND expires_at > ?
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        let started_at = now;
        let base = current_expiry.unwrap_or(now);
        let expires_at = base + Duration::days(plan.duration_days);

        // 旧的有效记录标记过期，保持单条 active
        sqlx::query(
            "UPDATE memberships SET status = 'expired' WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO memberships (user_id, plan_id, started_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(started_at)
        .bind(expires_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// 签发购买赠送的会员码（支付回调同事务内调用）
    pub async fn issue_code(conn: &mut SqliteConnection, plan_id: i64) -> AppResult<String> {
        // 撞码概率极低，重试几次足够
        for _ in 0..5 {
            let code = generate_membership_code();
            let result = sqlx::query(
                "INSERT OR IGNORE INTO membership_codes (code, plan_id, batch_no) VALUES (?, ?, NULL)",
            )
            .bind(&code)
            .bind(plan_id)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(code);
            }
        }

        Err(AppError::InternalError("生成会员码失败".to_string()))
    }

    // ---------- 后台 ----------

    pub async fn admin_list_plans(&self) -> AppResult<Vec<MembershipPlan>> {
        let plans =
            sqlx::query_as::<_, MembershipPlan>("SELECT * FROM membership_plans ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(plans)
    }

    pub async fn create_plan(&self, request: CreatePlanRequest) -> AppResult<MembershipPlan> {
        if request.duration_days < 1 {
            return Err(AppError::ValidationError("套餐时长至少1天".to_string()));
        }
        if request.price < 0 {
            return Err(AppError::ValidationError("套餐价格不能为负".to_string()));
        }
        if request.discount_rate < 0 || request.discount_rate > 1000 {
            return Err(AppError::ValidationError(
                "折扣率必须在0-1000（千分比）之间".to_string(),
            ));
        }

        let plan_id = sqlx::query(
            r#"
            INSERT INTO membership_plans (name, duration_days, price, discount_rate, description)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.name)
        .bind(request.duration_days)
        .bind(request.price)
        .bind(request.discount_rate)
        .bind(request.description.unwrap_or_default())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let plan =
            sqlx::query_as::<_, MembershipPlan>("SELECT * FROM membership_plans WHERE id = ?")
                .bind(plan_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(plan)
    }

    pub async fn update_plan(
        &self,
        plan_id: i64,
        request: UpdatePlanRequest,
    ) -> AppResult<MembershipPlan> {
        let plan =
            sqlx::query_as::<_, MembershipPlan>("SELECT * FROM membership_plans WHERE id = ?")
                .bind(plan_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound("会员套餐不存在".to_string()))?;

        let discount_rate = request.discount_rate.unwrap_or(plan.discount_rate);
        if !(0..=1000).contains(&discount_rate) {
            return Err(AppError::ValidationError(
                "折扣率必须在0-1000（千分比）之间".to_string(),
            ));
        }

        sqlx::query(
            r#"
            UPDATE membership_plans SET
                name = ?, duration_days = ?, price = ?, discount_rate = ?,
                description = ?, status = ?
            WHERE id = ?
            "#,
        )
        .bind(request.name.unwrap_or(plan.name))
        .bind(request.duration_days.unwrap_or(plan.duration_days))
        .bind(request.price.unwrap_or(plan.price))
        .bind(discount_rate)
        .bind(request.description.unwrap_or(plan.description))
        .bind(request.status.unwrap_or(plan.status))
        .bind(plan_id)
        .execute(&self.pool)
        .await?;

        let plan =
            sqlx::query_as::<_, MembershipPlan>("SELECT * FROM membership_plans WHERE id = ?")
                .bind(plan_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(plan)
    }

    /// 批量生成会员码
    pub async fn generate_codes(
        &self,
        request: GenerateCodesRequest,
    ) -> AppResult<GenerateCodesResponse> {
        if request.count == 0 || request.count > 1000 {
            return Err(AppError::ValidationError(
                "单批生成数量必须在1-1000之间".to_string(),
            ));
        }

        let plan_exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM membership_plans WHERE id = ?")
                .bind(request.plan_id)
                .fetch_optional(&self.pool)
                .await?;
        if plan_exists.is_none() {
            return Err(AppError::NotFound("会员套餐不存在".to_string()));
        }

        let batch_no = generate_batch_no();
        let mut codes = Vec::with_capacity(request.count as usize);
        let mut tx = self.pool.begin().await?;

        while codes.len() < request.count as usize {
            let code = generate_membership_code();
            let result = sqlx::query(
                "INSERT OR IGNORE INTO membership_codes (code, plan_id, batch_no) VALUES (?, ?, ?)",
            )
            .bind(&code)
            .bind(request.plan_id)
            .bind(&batch_no)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                codes.push(code);
            }
        }

        tx.commit().await?;

        Ok(GenerateCodesResponse { batch_no, codes })
    }

    pub async fn list_codes(
        &self,
        query: &MembershipCodeQuery,
    ) -> AppResult<PaginatedResponse<MembershipCode>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut where_sql = String::from("WHERE 1=1");
        if query.plan_id.is_some() {
            where_sql.push_str(" AND plan_id = ?");
        }
        if query.status.is_some() {
            where_sql.push_str(" AND status = ?");
        }
        if query.batch_no.is_some() {
            where_sql.push_str(" AND batch_no = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM membership_codes {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(plan_id) = query.plan_id {
            count_query = count_query.bind(plan_id);
        }
        if let Some(status) = &query.status {
            count_query = count_query.bind(status.clone());
        }
        if let Some(batch_no) = &query.batch_no {
            count_query = count_query.bind(batch_no.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql =
            format!("SELECT * FROM membership_codes {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?");
        let mut list_query = sqlx::query_as::<_, MembershipCode>(&list_sql);
        if let Some(plan_id) = query.plan_id {
            list_query = list_query.bind(plan_id);
        }
        if let Some(status) = &query.status {
            list_query = list_query.bind(status.clone());
        }
        if let Some(batch_no) = &query.batch_no {
            list_query = list_query.bind(batch_no.clone());
        }
        let codes = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(codes, &params, total))
    }

    pub async fn disable_code(&self, code_id: i64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE membership_codes SET status = 'disabled' WHERE id = ? AND status = 'unused'",
        )
        .bind(code_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ValidationError(
                "会员码不存在或已被使用".to_string(),
            ));
        }
        Ok(())
    }

    /// 过期失效会员（后台任务调用）
    pub async fn expire_memberships(&self) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE memberships SET status = 'expired' WHERE status = 'active' AND expires_at <= ?",
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

    async fn seed_plan(pool: &SqlitePool, name: &str, duration_days: i64) -> i64 {
        sqlx::query(
            "INSERT INTO membership_plans (name, duration_days, price, discount_rate) VALUES (?, ?, 2900, 900)",
        )
        .bind(name)
        .bind(duration_days)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn seed_code(pool: &SqlitePool, plan_id: i64, code: &str) {
        sqlx::query("INSERT INTO membership_codes (code, plan_id) VALUES (?, ?)")
            .bind(code)
            .bind(plan_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_redeem_code_activates_membership() {
        let pool = setup_pool().await;
        let svc = MembershipService::new(pool.clone());
        let user_id = seed_user(&pool, "alice").await;
        let plan_id = seed_plan(&pool, "月卡", 30).await;
        seed_code(&pool, plan_id, "ABCD2345").await;

        let membership = svc
            .redeem_code(
                user_id,
                RedeemCodeRequest {
                    code: " abcd2345 ".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(membership.plan_id, plan_id);

        let days = (membership.expires_at - Utc::now().naive_utc()).num_days();
        assert!((29..=30).contains(&days));
    }

    #[tokio::test]
    async fn test_redeem_code_is_single_use() {
        let pool = setup_pool().await;
        let svc = MembershipService::new(pool.clone());
        let alice = seed_user(&pool, "alice").await;
        let bob = seed_user(&pool, "bob").await;
        let plan_id = seed_plan(&pool, "月卡", 30).await;
        seed_code(&pool, plan_id, "ABCD2345").await;

        let request = |code: &str| RedeemCodeRequest {
            code: code.to_string(),
        };
        svc.redeem_code(alice, request("ABCD2345")).await.unwrap();
        assert!(svc.redeem_code(bob, request("ABCD2345")).await.is_err());
        assert!(svc.redeem_code(bob, request("NOPE")).await.is_err());
    }

    #[tokio::test]
    async fn test_activation_extends_current_expiry() {
        let pool = setup_pool().await;
        let svc = MembershipService::new(pool.clone());
        let user_id = seed_user(&pool, "carol").await;
        let plan_id = seed_plan(&pool, "月卡", 30).await;

        // 已有 10 天有效期的会员
        sqlx::query(
            "INSERT INTO memberships (user_id, plan_id, started_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(Utc::now().naive_utc())
        .bind((Utc::now() + Duration::days(10)).naive_utc())
        .execute(&pool)
        .await
        .unwrap();

        seed_code(&pool, plan_id, "ABCD2345").await;
        let membership = svc
            .redeem_code(
                user_id,
                RedeemCodeRequest {
                    code: "ABCD2345".to_string(),
                },
            )
            .await
            .unwrap();

        // 在原到期日上顺延，而不是从今天重算
        let days = (membership.expires_at - Utc::now().naive_utc()).num_days();
        assert!((39..=40).contains(&days));

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn test_generate_codes_batch() {
        let pool = setup_pool().await;
        let svc = MembershipService::new(pool.clone());
        let plan_id = seed_plan(&pool, "年卡", 365).await;

        let response = svc
            .generate_codes(GenerateCodesRequest { plan_id, count: 5 })
            .await
            .unwrap();
        assert_eq!(response.codes.len(), 5);

        let stored: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM membership_codes WHERE batch_no = ?")
                .bind(&response.batch_no)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(stored, 5);

        // 数量越界
        assert!(svc
            .generate_codes(GenerateCodesRequest { plan_id, count: 0 })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disabled_code_cannot_be_redeemed() {
        let pool = setup_pool().await;
        let svc = MembershipService::new(pool.clone());
        let user_id = seed_user(&pool, "dave").await;
        let plan_id = seed_plan(&pool, "月卡", 30).await;
        seed_code(&pool, plan_id, "ABCD2345").await;

        let code_id: i64 =
            sqlx::query_scalar("SELECT id FROM membership_codes WHERE code = 'ABCD2345'")
                .fetch_one(&pool)
                .await
                .unwrap();
        svc.disable_code(code_id).await.unwrap();

        assert!(svc
            .redeem_code(
                user_id,
                RedeemCodeRequest {
                    code: "ABCD2345".to_string(),
                },
            )
            .await
            .is_err());
        // 已禁用不可重复禁用
        assert!(svc.disable_code(code_id).await.is_err());
    }

    #[tokio::test]
    async fn test_create_plan_validates_discount_rate() {
        let pool = setup_pool().await;
        let svc = MembershipService::new(pool.clone());

        let result = svc
            .create_plan(CreatePlanRequest {
                name: "坏套餐".to_string(),
                duration_days: 30,
                price: 100,
                discount_rate: 1200,
                description: None,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_expire_memberships_task() {
        let pool = setup_pool().await;
        let svc = MembershipService::new(pool.clone());
        let user_id = seed_user(&pool, "erin").await;
        let plan_id = seed_plan(&pool, "月卡", 30).await;

        sqlx::query(
            "INSERT INTO memberships (user_id, plan_id, started_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(plan_id)
        .bind((Utc::now() - Duration::days(40)).naive_utc())
        .bind((Utc::now() - Duration::days(10)).naive_utc())
        .execute(&pool)
        .await
        .unwrap();

        let expired = svc.expire_memberships().await.unwrap();
        assert_eq!(expired, 1);
        assert!(svc.get_my_membership(user_id).await.unwrap().is_none());
    }
}
