use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::admin::modules;
use crate::models::*;
use crate::services::SystemService;

/// 后台权限校验与角色/用户管理。
///
/// 超级管理员 = is_admin 且未绑定角色（role_id 为空），拥有全部权限；
/// 普通管理员按角色的模块×级别授权。
#[derive(Clone)]
pub struct AdminService {
    pool: SqlitePool,
    system_service: SystemService,
}

impl AdminService {
    pub fn new(pool: SqlitePool, system_service: SystemService) -> Self {
        Self {
            pool,
            system_service,
        }
    }

    /// 校验管理员对某模块至少持有 required 级别，越权访问产生告警
    pub async fn require_permission(
        &self,
        admin_id: i64,
        module: &str,
        required: i64,
    ) -> AppResult<()> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(admin_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("用户不存在".to_string()))?;

        if !user.is_admin {
            self.deny(admin_id, module).await;
            return Err(AppError::PermissionDenied("无后台访问权限".to_string()));
        }

        let role_id = match user.role_id {
            // 超级管理员
            None => return Ok(()),
            Some(id) => id,
        };

        let level: Option<i64> = sqlx::query_scalar(
            "SELECT level FROM role_permissions WHERE role_id = ? AND module = ?",
        )
        .bind(role_id)
        .bind(module)
        .fetch_optional(&self.pool)
        .await?;

        if level.unwrap_or(LEVEL_NONE) >= required {
            return Ok(());
        }

        self.deny(admin_id, module).await;
        Err(AppError::PermissionDenied("当前角色无此模块权限".to_string()))
    }

    async fn deny(&self, admin_id: i64, module: &str) {
        self.system_service
            .record_alert(
                "permission_denied",
                AlertLevel::Warning,
                &format!("管理员{admin_id}越权访问模块{module}"),
                None,
                Some(admin_id),
            )
            .await;
    }

    // ---------- 角色管理 ----------

    pub async fn list_roles(&self) -> AppResult<Vec<RoleResponse>> {
        let roles = sqlx::query_as::<_, AdminRole>("SELECT * FROM admin_roles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut responses = Vec::with_capacity(roles.len());
        for role in roles {
            let permissions = self.load_permissions(role.id).await?;
            responses.push(RoleResponse {
                id: role.id,
                name: role.name,
                description: role.description,
                permissions,
            });
        }
        Ok(responses)
    }

    pub async fn create_role(&self, request: CreateRoleRequest) -> AppResult<RoleResponse> {
        if request.name.trim().is_empty() {
            return Err(AppError::ValidationError("角色名称不能为空".to_string()));
        }
        Self::validate_permissions(&request.permissions)?;

        let mut tx = self.pool.begin().await?;

        let role_id = sqlx::query("INSERT INTO admin_roles (name, description) VALUES (?, ?)")
            .bind(request.name.trim())
            .bind(request.description.unwrap_or_default())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for p in &request.permissions {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, module, level) VALUES (?, ?, ?)",
            )
            .bind(role_id)
            .bind(&p.module)
            .bind(p.level)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get_role(role_id).await
    }

    pub async fn update_role(
        &self,
        role_id: i64,
        request: UpdateRoleRequest,
    ) -> AppResult<RoleResponse> {
        let role = sqlx::query_as::<_, AdminRole>("SELECT * FROM admin_roles WHERE id = ?")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("角色不存在".to_string()))?;

        if let Some(permissions) = &request.permissions {
            Self::validate_permissions(permissions)?;
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE admin_roles SET name = ?, description = ? WHERE id = ?")
            .bind(request.name.unwrap_or(role.name))
            .bind(request.description.unwrap_or(role.description))
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        if let Some(permissions) = &request.permissions {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
                .bind(role_id)
                .execute(&mut *tx)
                .await?;
            for p in permissions {
                sqlx::query(
                    "INSERT INTO role_permissions (role_id, module, level) VALUES (?, ?, ?)",
                )
                .bind(role_id)
                .bind(&p.module)
                .bind(p.level)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        self.get_role(role_id).await
    }

    pub async fn delete_role(&self, role_id: i64) -> AppResult<()> {
        let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role_id = ?")
            .bind(role_id)
            .fetch_one(&self.pool)
            .await?;
        if in_use > 0 {
            return Err(AppError::ValidationError(
                "仍有管理员使用该角色，无法删除".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM admin_roles WHERE id = ?")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("角色不存在".to_string()));
        }
        Ok(())
    }

    // ---------- 用户管理 ----------

    pub async fn list_users(&self, query: &UserQuery) -> AppResult<PaginatedResponse<UserResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut where_sql = String::from("WHERE 1=1");
        if query.keyword.is_some() {
            where_sql.push_str(" AND (username LIKE ? OR email LIKE ? OR nickname LIKE ?)");
        }
        if query.status.is_some() {
            where_sql.push_str(" AND status = ?");
        }
        let keyword = query.keyword.as_ref().map(|k| format!("%{}%", k.trim()));

        let count_sql = format!("SELECT COUNT(*) FROM users {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(k) = &keyword {
            count_query = count_query.bind(k.clone()).bind(k.clone()).bind(k.clone());
        }
        if let Some(status) = &query.status {
            count_query = count_query.bind(status.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!("SELECT * FROM users {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?");
        let mut list_query = sqlx::query_as::<_, User>(&list_sql);
        if let Some(k) = &keyword {
            list_query = list_query.bind(k.clone()).bind(k.clone()).bind(k.clone());
        }
        if let Some(status) = &query.status {
            list_query = list_query.bind(status.clone());
        }
        let users = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let users = users.into_iter().map(UserResponse::from).collect();
        Ok(PaginatedResponse::new(users, &params, total))
    }

    /// 授予/调整/撤销管理员角色
    pub async fn assign_role(&self, request: AssignRoleRequest) -> AppResult<()> {
        if let Some(role_id) = request.role_id {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM admin_roles WHERE id = ?")
                .bind(role_id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(AppError::NotFound("角色不存在".to_string()));
            }
        }

        let is_admin = request.role_id.is_some();
        let result = sqlx::query(
            "UPDATE users SET is_admin = ?, role_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(is_admin)
        .bind(request.role_id)
        .bind(request.user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("用户不存在".to_string()));
        }
        Ok(())
    }

    pub async fn update_user_status(
        &self,
        user_id: i64,
        request: UpdateUserStatusRequest,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(request.status)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("用户不存在".to_string()));
        }
        Ok(())
    }

    async fn get_role(&self, role_id: i64) -> AppResult<RoleResponse> {
        let role = sqlx::query_as::<_, AdminRole>("SELECT * FROM admin_roles WHERE id = ?")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("角色不存在".to_string()))?;

        let permissions = self.load_permissions(role_id).await?;
        Ok(RoleResponse {
            id: role.id,
            name: role.name,
            description: role.description,
            permissions,
        })
    }

    async fn load_permissions(&self, role_id: i64) -> AppResult<Vec<PermissionItem>> {
        let rows = sqlx::query_as::<_, RolePermission>(
            "SELECT * FROM role_permissions WHERE role_id = ? ORDER BY module",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|p| PermissionItem {
                module: p.module,
                level: p.level,
            })
            .collect())
    }

    fn validate_permissions(permissions: &[PermissionItem]) -> AppResult<()> {
        let known = [
            modules::CATALOG,
            modules::ORDER,
            modules::MEMBERSHIP,
            modules::DISTRIBUTION,
            modules::SYSTEM,
            modules::CHAT,
        ];

        for p in permissions {
            if !known.contains(&p.module.as_str()) {
                return Err(AppError::ValidationError(format!(
                    "未知权限模块: {}",
                    p.module
                )));
            }
            if !(LEVEL_NONE..=LEVEL_MANAGE).contains(&p.level) {
                return Err(AppError::ValidationError(format!(
                    "权限级别必须在{LEVEL_NONE}-{LEVEL_MANAGE}之间"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (SqlitePool, AdminService) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let svc = AdminService::new(pool.clone(), SystemService::new(pool.clone()));
        (pool, svc)
    }

    async fn seed_user(pool: &SqlitePool, username: &str, is_admin: bool) -> i64 {
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, is_admin) VALUES (?, ?, 'x', ?)",
        )
        .bind(username)
        .bind(format!("{username}@test.local"))
        .bind(is_admin)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    fn permission(module: &str, level: i64) -> PermissionItem {
        PermissionItem {
            module: module.to_string(),
            level,
        }
    }

    #[tokio::test]
    async fn test_super_admin_passes_all_modules() {
        let (pool, svc) = setup().await;
        let admin_id = seed_user(&pool, "root", true).await;

        svc.require_permission(admin_id, modules::SYSTEM, LEVEL_MANAGE)
            .await
            .unwrap();
        svc.require_permission(admin_id, modules::CHAT, LEVEL_MANAGE)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_admin_denied_with_alert() {
        let (pool, svc) = setup().await;
        let user_id = seed_user(&pool, "alice", false).await;

        let result = svc
            .require_permission(user_id, modules::CATALOG, LEVEL_READ)
            .await;
        assert!(result.is_err());

        let alerts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM security_alerts WHERE alert_type = 'permission_denied' AND user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn test_role_level_gates_access() {
        let (pool, svc) = setup().await;
        let admin_id = seed_user(&pool, "operator", true).await;

        let role = svc
            .create_role(CreateRoleRequest {
                name: "运营".to_string(),
                description: None,
                permissions: vec![
                    permission(modules::CATALOG, LEVEL_MANAGE),
                    permission(modules::ORDER, LEVEL_READ),
                ],
            })
            .await
            .unwrap();
        svc.assign_role(AssignRoleRequest {
            user_id: admin_id,
            role_id: Some(role.id),
        })
        .await
        .unwrap();

        svc.require_permission(admin_id, modules::CATALOG, LEVEL_MANAGE)
            .await
            .unwrap();
        svc.require_permission(admin_id, modules::ORDER, LEVEL_READ)
            .await
            .unwrap();
        // 只读角色不能写
        assert!(svc
            .require_permission(admin_id, modules::ORDER, LEVEL_MANAGE)
            .await
            .is_err());
        // 未授权模块默认无权限
        assert!(svc
            .require_permission(admin_id, modules::MEMBERSHIP, LEVEL_READ)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_create_role_rejects_unknown_module() {
        let (_pool, svc) = setup().await;

        let result = svc
            .create_role(CreateRoleRequest {
                name: "坏角色".to_string(),
                description: None,
                permissions: vec![permission("nonexistent", LEVEL_READ)],
            })
            .await;
        assert!(result.is_err());

        let result = svc
            .create_role(CreateRoleRequest {
                name: "坏角色".to_string(),
                description: None,
                permissions: vec![permission(modules::CATALOG, 9)],
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_assign_role_toggles_admin_flag() {
        let (pool, svc) = setup().await;
        let user_id = seed_user(&pool, "bob", false).await;

        let role = svc
            .create_role(CreateRoleRequest {
                name: "客服".to_string(),
                description: Some("聊天处理".to_string()),
                permissions: vec![permission(modules::CHAT, LEVEL_MANAGE)],
            })
            .await
            .unwrap();
        svc.assign_role(AssignRoleRequest {
            user_id,
            role_id: Some(role.id),
        })
        .await
        .unwrap();
        svc.require_permission(user_id, modules::CHAT, LEVEL_MANAGE)
            .await
            .unwrap();

        // 撤销角色后失去后台权限
        svc.assign_role(AssignRoleRequest {
            user_id,
            role_id: None,
        })
        .await
        .unwrap();
        assert!(svc
            .require_permission(user_id, modules::CHAT, LEVEL_READ)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_role_blocked_while_in_use() {
        let (pool, svc) = setup().await;
        let user_id = seed_user(&pool, "carol", false).await;

        let role = svc
            .create_role(CreateRoleRequest {
                name: "财务".to_string(),
                description: None,
                permissions: vec![permission(modules::DISTRIBUTION, LEVEL_MANAGE)],
            })
            .await
            .unwrap();
        svc.assign_role(AssignRoleRequest {
            user_id,
            role_id: Some(role.id),
        })
        .await
        .unwrap();

        assert!(svc.delete_role(role.id).await.is_err());

        svc.assign_role(AssignRoleRequest {
            user_id,
            role_id: None,
        })
        .await
        .unwrap();
        svc.delete_role(role.id).await.unwrap();
        assert!(svc.delete_role(role.id).await.is_err());
    }
}
