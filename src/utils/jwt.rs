use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String, // "access" or "refresh"
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expires_in: i64,
    refresh_token_expires_in: i64,
}

impl JwtService {
    pub fn new(secret: &str, access_expires_in: i64, refresh_expires_in: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expires_in: access_expires_in,
            refresh_token_expires_in: refresh_expires_in,
        }
    }

    pub fn generate_access_token(&self, user_id: i64, username: &str) -> AppResult<String> {
        self.generate_token(user_id, username, "access", self.access_token_expires_in)
    }

    pub fn generate_refresh_token(&self, user_id: i64, username: &str) -> AppResult<String> {
        self.generate_token(user_id, username, "refresh", self.refresh_token_expires_in)
    }

    fn generate_token(
        &self,
        user_id: i64,
        username: &str,
        token_type: &str,
        expires_in: i64,
    ) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(expires_in);

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            token_type: token_type.to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AppError::JwtError)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::JwtError)
    }

    pub fn verify_access_token(&self, token: &str) -> AppResult<Claims> {
        let claims = self.verify_token(token)?;

        if claims.token_type != "access" {
            return Err(AppError::AuthError("Invalid access token type".to_string()));
        }

        Ok(claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> AppResult<Claims> {
        let claims = self.verify_token(token)?;

        if claims.token_type != "refresh" {
            return Err(AppError::AuthError(
                "Invalid refresh token type".to_string(),
            ));
        }

        Ok(claims)
    }

    pub fn get_access_token_expires_in(&self) -> i64 {
        self.access_token_expires_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_roundtrip() {
        let svc = JwtService::new("test-secret", 3600, 86400);
        let token = svc.generate_access_token(42, "alice").unwrap();
        let claims = svc.verify_access_token(&token).unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.token_type, "access");
    }

    #[test]
    fn test_refresh_token_not_usable_as_access() {
        let svc = JwtService::new("test-secret", 3600, 86400);
        let token = svc.generate_refresh_token(42, "alice").unwrap();

        assert!(svc.verify_access_token(&token).is_err());
        assert!(svc.verify_refresh_token(&token).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let svc = JwtService::new("secret-a", 3600, 86400);
        let other = JwtService::new("secret-b", 3600, 86400);
        let token = svc.generate_access_token(1, "bob").unwrap();

        assert!(other.verify_access_token(&token).is_err());
    }
}
