use std::time::Duration;

use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::SystemService;
use crate::utils::*;

/// 同一来源 5 分钟内最多允许 5 次失败登录
const LOGIN_WINDOW: Duration = Duration::from_secs(300);
const LOGIN_ATTEMPT_LIMIT: u32 = 5;

#[derive(Clone)]
pub struct AuthService {
    pool: SqlitePool,
    jwt_service: JwtService,
    system_service: SystemService,
    login_limiter: RateLimiter,
}

impl AuthService {
    pub fn new(pool: SqlitePool, jwt_service: JwtService, system_service: SystemService) -> Self {
        Self {
            pool,
            jwt_service,
            system_service,
            login_limiter: RateLimiter::new(4096, LOGIN_WINDOW, LOGIN_ATTEMPT_LIMIT),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        validate_username(&request.username)?;
        validate_email(&request.email)?;
        validate_password(&request.password)?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE username = ? OR email = ?")
                .bind(&request.username)
                .bind(&request.email)
                .fetch_optional(&self.pool)
                .await?;

        if existing.is_some() {
            return Err(AppError::ValidationError(
                "用户名或邮箱已被注册".to_string(),
            ));
        }

        // 绑定分销邀请码（可选）。无效邀请码直接拒绝，避免静默丢失推荐关系
        let referrer_distributor_id = match &request.invite_code {
            Some(code) if !code.is_empty() => {
                let distributor_id: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM distributors WHERE invite_code = ? AND status = 'approved'",
                )
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

                match distributor_id {
                    Some(id) => Some(id),
                    None => {
                        return Err(AppError::ValidationError("邀请码无效".to_string()));
                    }
                }
            }
            _ => None,
        };

        let password_hash = hash_password(&request.password)?;
        let nickname = request
            .nickname
            .clone()
            .unwrap_or_else(|| request.username.clone());

        let user_id = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, nickname, referrer_distributor_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.username)
        .bind(&request.email)
        .bind(&password_hash)
        .bind(&nickname)
        .bind(referrer_distributor_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let user = self.get_user_by_id(user_id).await?;
        self.build_auth_response(user)
    }

    pub async fn login(&self, request: LoginRequest, ip: Option<&str>) -> AppResult<AuthResponse> {
        let limiter_key = format!("login:{}:{}", request.username, ip.unwrap_or("-"));
        if !self.login_limiter.check(&limiter_key) {
            self.system_service
                .record_alert(
                    "login_throttled",
                    AlertLevel::Warning,
                    &format!("账户 {} 登录尝试过于频繁", request.username),
                    ip,
                    None,
                )
                .await;
            return Err(AppError::AuthError(
                "登录尝试过于频繁，请稍后再试".to_string(),
            ));
        }

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(&request.username)
            .fetch_optional(&self.pool)
            .await?;

        let user = match user {
            Some(u) => u,
            None => {
                return Err(AppError::AuthError("用户不存在或密码错误".to_string()));
            }
        };

        let is_valid = verify_password(&request.password, &user.password_hash)?;
        if !is_valid {
            // 连续失败达到阈值时写安全告警
            if self.login_limiter.count(&limiter_key) >= LOGIN_ATTEMPT_LIMIT {
                self.system_service
                    .record_alert(
                        "login_failure",
                        AlertLevel::Warning,
                        &format!("账户 {} 连续登录失败", user.username),
                        ip,
                        Some(user.id),
                    )
                    .await;
            }
            return Err(AppError::AuthError("用户不存在或密码错误".to_string()));
        }

        if user.status == UserStatus::Disabled {
            self.system_service
                .record_alert(
                    "disabled_account_login",
                    AlertLevel::Warning,
                    &format!("已禁用账户 {} 尝试登录", user.username),
                    ip,
                    Some(user.id),
                )
                .await;
            return Err(AppError::AuthError("账户已被禁用".to_string()));
        }

        // 成功登录后清空失败计数
        self.login_limiter.reset(&limiter_key);

        self.build_auth_response(user)
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let claims = self.jwt_service.verify_refresh_token(refresh_token)?;
        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::AuthError("无效的令牌".to_string()))?;

        let user = self.get_user_by_id(user_id).await?;
        if user.status == UserStatus::Disabled {
            return Err(AppError::AuthError("账户已被禁用".to_string()));
        }

        let access_token = self
            .jwt_service
            .generate_access_token(user.id, &user.username)?;

        Ok(AuthResponse {
            user: UserResponse::from(user),
            access_token,
            refresh_token: refresh_token.to_string(),
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }

    async fn get_user_by_id(&self, user_id: i64) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        user.ok_or_else(|| AppError::NotFound("用户不存在".to_string()))
    }

    fn build_auth_response(&self, user: User) -> AppResult<AuthResponse> {
        let access_token = self
            .jwt_service
            .generate_access_token(user.id, &user.username)?;
        let refresh_token = self
            .jwt_service
            .generate_refresh_token(user.id, &user.username)?;

        Ok(AuthResponse {
            user: UserResponse::from(user),
            access_token,
            refresh_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (SqlitePool, AuthService) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let jwt = JwtService::new("test-secret", 7200, 2_592_000);
        let svc = AuthService::new(pool.clone(), jwt, SystemService::new(pool.clone()));
        (pool, svc)
    }

    fn register_request(username: &str, invite_code: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: format!("{username}@test.local"),
            password: "Passw0rd123".to_string(),
            nickname: None,
            invite_code: invite_code.map(|c| c.to_string()),
        }
    }

    fn login_request(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (_pool, svc) = setup().await;

        let registered = svc.register(register_request("alice", None)).await.unwrap();
        assert_eq!(registered.user.username, "alice");
        assert!(!registered.access_token.is_empty());

        let logged_in = svc
            .login(login_request("alice", "Passw0rd123"), None)
            .await
            .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);

        assert!(svc
            .login(login_request("alice", "wrong-password"), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let (_pool, svc) = setup().await;

        svc.register(register_request("alice", None)).await.unwrap();
        assert!(svc.register(register_request("alice", None)).await.is_err());
    }

    #[tokio::test]
    async fn test_register_with_invite_code() {
        let (pool, svc) = setup().await;

        let referrer = svc.register(register_request("referrer", None)).await.unwrap();
        let distributor_id = sqlx::query(
            "INSERT INTO distributors (user_id, invite_code, status) VALUES (?, 'GOODCODE', 'approved')",
        )
        .bind(referrer.user.id)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let buyer = svc
            .register(register_request("buyer", Some("GOODCODE")))
            .await
            .unwrap();
        let bound: Option<i64> =
            sqlx::query_scalar("SELECT referrer_distributor_id FROM users WHERE id = ?")
                .bind(buyer.user.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(bound, Some(distributor_id));

        // 无效邀请码直接拒绝注册
        assert!(svc
            .register(register_request("other", Some("BADCODE")))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disabled_account_cannot_login() {
        let (pool, svc) = setup().await;

        let registered = svc.register(register_request("alice", None)).await.unwrap();
        sqlx::query("UPDATE users SET status = 'disabled' WHERE id = ?")
            .bind(registered.user.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(svc
            .login(login_request("alice", "Passw0rd123"), None)
            .await
            .is_err());
        let alerts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM security_alerts WHERE alert_type = 'disabled_account_login'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn test_login_throttled_after_repeated_failures() {
        let (pool, svc) = setup().await;
        svc.register(register_request("alice", None)).await.unwrap();

        for _ in 0..LOGIN_ATTEMPT_LIMIT {
            let _ = svc
                .login(login_request("alice", "wrong-password"), Some("1.2.3.4"))
                .await;
        }
        let result = svc
            .login(login_request("alice", "Passw0rd123"), Some("1.2.3.4"))
            .await;
        assert!(result.is_err());

        let alerts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM security_alerts WHERE alert_type = 'login_throttled'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(alerts >= 1);

        // 换一个来源不受影响
        svc.login(login_request("alice", "Passw0rd123"), Some("5.6.7.8"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_token_issues_new_access_token() {
        let (_pool, svc) = setup().await;

        let registered = svc.register(register_request("alice", None)).await.unwrap();
        let refreshed = svc.refresh_token(&registered.refresh_token).await.unwrap();
        assert_eq!(refreshed.user.id, registered.user.id);
        assert!(!refreshed.access_token.is_empty());

        // access token 不能当 refresh token 用
        assert!(svc.refresh_token(&registered.access_token).await.is_err());
    }
}
