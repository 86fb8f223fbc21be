use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::*;

/// 系统配置、操作日志与安全告警。
#[derive(Clone)]
pub struct SystemService {
    pool: SqlitePool,
}

impl SystemService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 记录安全告警。告警写入失败只记日志，不影响主流程。
    pub async fn record_alert(
        &self,
        alert_type: &str,
        level: AlertLevel,
        message: &str,
        ip: Option<&str>,
        user_id: Option<i64>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO security_alerts (alert_type, level, message, ip, user_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert_type)
        .bind(&level)
        .bind(message)
        .bind(ip)
        .bind(user_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            log::error!("Failed to record security alert ({alert_type}): {e:?}");
        }
    }

    /// 记录后台操作日志
    pub async fn log_action(
        &self,
        admin_id: i64,
        module: &str,
        action: &str,
        detail: &str,
        ip: Option<&str>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO system_logs (admin_id, module, action, detail, ip)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(admin_id)
        .bind(module)
        .bind(action)
        .bind(detail)
        .bind(ip)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            log::error!("Failed to write system log ({module}/{action}): {e:?}");
        }
    }

    pub async fn list_alerts(
        &self,
        query: &AlertQuery,
    ) -> AppResult<PaginatedResponse<SecurityAlert>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut where_sql = String::from("WHERE 1=1");
        if query.level.is_some() {
            where_sql.push_str(" AND level = ?");
        }
        if query.resolved.is_some() {
            where_sql.push_str(" AND resolved = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM security_alerts {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(level) = &query.level {
            count_query = count_query.bind(level.clone());
        }
        if let Some(resolved) = query.resolved {
            count_query = count_query.bind(resolved);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM security_alerts {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query_as::<_, SecurityAlert>(&list_sql);
        if let Some(level) = &query.level {
            list_query = list_query.bind(level.clone());
        }
        if let Some(resolved) = query.resolved {
            list_query = list_query.bind(resolved);
        }
        let alerts = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(alerts, &params, total))
    }

    pub async fn resolve_alert(&self, alert_id: i64, admin_id: i64) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE security_alerts
            SET resolved = 1, resolved_by = ?, resolved_at = CURRENT_TIMESTAMP
            WHERE id = ? AND resolved = 0
            "#,
        )
        .bind(admin_id)
        .bind(alert_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("告警不存在或已处理".to_string()));
        }
        Ok(())
    }

    pub async fn list_logs(
        &self,
        query: &SystemLogQuery,
    ) -> AppResult<PaginatedResponse<SystemLog>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut where_sql = String::from("WHERE 1=1");
        if query.module.is_some() {
            where_sql.push_str(" AND module = ?");
        }
        if query.admin_id.is_some() {
            where_sql.push_str(" AND admin_id = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM system_logs {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(module) = &query.module {
            count_query = count_query.bind(module.clone());
        }
        if let Some(admin_id) = query.admin_id {
            count_query = count_query.bind(admin_id);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql =
            format!("SELECT * FROM system_logs {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?");
        let mut list_query = sqlx::query_as::<_, SystemLog>(&list_sql);
        if let Some(module) = &query.module {
            list_query = list_query.bind(module.clone());
        }
        if let Some(admin_id) = query.admin_id {
            list_query = list_query.bind(admin_id);
        }
        let logs = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(logs, &params, total))
    }

    pub async fn list_configs(&self) -> AppResult<Vec<SystemConfig>> {
        let configs = sqlx::query_as::<_, SystemConfig>(
            "SELECT * FROM system_configs ORDER BY config_key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(configs)
    }

    pub async fn get_config(&self, key: &str) -> AppResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT config_value FROM system_configs WHERE config_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    pub async fn upsert_config(&self, request: UpsertConfigRequest) -> AppResult<SystemConfig> {
        if request.config_key.trim().is_empty() {
            return Err(AppError::ValidationError("配置键不能为空".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO system_configs (config_key, config_value, description, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(config_key) DO UPDATE SET
                config_value = excluded.config_value,
                description = excluded.description,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&request.config_key)
        .bind(&request.config_value)
        .bind(request.description.unwrap_or_default())
        .execute(&self.pool)
        .await?;

        let config = sqlx::query_as::<_, SystemConfig>(
            "SELECT * FROM system_configs WHERE config_key = ?",
        )
        .bind(&request.config_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(config)
    }

    pub async fn dashboard_stats(&self) -> AppResult<DashboardStats> {
        let total_users =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_admin = 0")
                .fetch_one(&self.pool)
                .await?;
        let total_orders = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        let paid_orders =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE status = 'paid'")
                .fetch_one(&self.pool)
                .await?;
        let total_revenue = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(payable_amount), 0) FROM orders WHERE status = 'paid'",
        )
        .fetch_one(&self.pool)
        .await?;
        let pending_withdrawals = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM commission_withdrawals WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await?;
        let open_alerts =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM security_alerts WHERE resolved = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(DashboardStats {
            total_users,
            total_orders,
            paid_orders,
            total_revenue,
            pending_withdrawals,
            open_alerts,
        })
    }
}
