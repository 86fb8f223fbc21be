use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::{hash_password, validate_password, verify_password};

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
}

impl UserService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_profile(&self, user_id: i64) -> AppResult<UserResponse> {
        let user = self.get_user_by_id(user_id).await?;
        Ok(UserResponse::from(user))
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        request: UpdateProfileRequest,
    ) -> AppResult<UserResponse> {
        let user = self.get_user_by_id(user_id).await?;

        let nickname = request.nickname.unwrap_or(user.nickname);
        if nickname.trim().is_empty() || nickname.chars().count() > 32 {
            return Err(AppError::ValidationError(
                "昵称不能为空且不超过32个字符".to_string(),
            ));
        }
        let avatar = request.avatar.or(user.avatar);

        sqlx::query(
            "UPDATE users SET nickname = ?, avatar = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&nickname)
        .bind(&avatar)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let user = self.get_user_by_id(user_id).await?;
        Ok(UserResponse::from(user))
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        request: ChangePasswordRequest,
    ) -> AppResult<()> {
        let user = self.get_user_by_id(user_id).await?;

        let is_valid = verify_password(&request.old_password, &user.password_hash)?;
        if !is_valid {
            return Err(AppError::AuthError("原密码错误".to_string()));
        }

        validate_password(&request.new_password)?;
        let password_hash = hash_password(&request.new_password)?;

        sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user_by_id(&self, user_id: i64) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        user.ok_or_else(|| AppError::NotFound("用户不存在".to_string()))
    }
}
