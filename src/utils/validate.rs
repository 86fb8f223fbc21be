use crate::error::{AppError, AppResult};
use regex::Regex;

/// 验证邮箱格式
pub fn validate_email(email: &str) -> AppResult<()> {
    let email_regex = Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();

    if !email_regex.is_match(email) {
        return Err(AppError::ValidationError("邮箱格式无效".to_string()));
    }

    Ok(())
}

/// 验证用户名格式：4-32 位字母数字下划线，字母开头
pub fn validate_username(username: &str) -> AppResult<()> {
    let username_regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]{3,31}$").unwrap();

    if !username_regex.is_match(username) {
        return Err(AppError::ValidationError(
            "用户名必须以字母开头，由4-32位字母、数字或下划线组成".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.example.cn").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("user@nodot").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("ab").is_err()); // 太短
        assert!(validate_username("1abc").is_err()); // 数字开头
        assert!(validate_username("bad name").is_err());
    }
}
