use crate::error::{AppError, AppResult};
use bcrypt::{DEFAULT_COST, hash, verify};

/// 验证密码强度
pub fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < 8 || password.len() > 128 {
        return Err(AppError::ValidationError(
            "密码长度必须在8-128字符之间".to_string(),
        ));
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter || !has_digit {
        return Err(AppError::ValidationError(
            "密码必须同时包含字母和数字".to_string(),
        ));
    }

    Ok(())
}

/// 对密码进行哈希
pub fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST).map_err(|e| AppError::InternalError(format!("密码哈希失败: {e}")))
}

/// 验证密码
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    verify(password, hash).map_err(|e| AppError::InternalError(format!("密码验证失败: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("passwordonly").is_err()); // 缺少数字
        assert!(validate_password("12345678").is_err()); // 缺少字母
        assert!(validate_password("pass1").is_err()); // 太短
    }

    #[test]
    fn test_hash_and_verify_password() {
        let password = "password123";
        let hashed = hash_password(password).unwrap();

        assert!(verify_password(password, &hashed).unwrap());
        assert!(!verify_password("wrong-password1", &hashed).unwrap());
    }
}
