use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{digest::KeyInit, Hmac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

/// Срок действия токена по умолчанию (24 часа).
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid signing key")]
    InvalidKey,

    #[error("token signing failed")]
    SigningFailed,

    #[error("invalid or expired token")]
    InvalidToken,
}

/// Claims, зашитые в bearer-токен.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Идентификатор пользователя.
    pub user_id: String,
    pub email: String,
    /// Момент выпуска, unix-секунды.
    pub iat: u64,
    /// Момент истечения, unix-секунды.
    pub exp: u64,
}

/// Выпуск и проверка HMAC-SHA256-подписанных токенов.
#[derive(Clone)]
pub struct TokenManager {
    key: Hmac<Sha256>,
    ttl: Duration,
}

impl TokenManager {
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        Self::with_ttl(secret, DEFAULT_TOKEN_TTL)
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Result<Self, AuthError> {
        let key =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidKey)?;
        Ok(Self { key, ttl })
    }

    /// Выпускает подписанный токен для пользователя.
    pub fn issue(&self, user_id: &str, email: &str) -> Result<String, AuthError> {
        let now = Self::current_timestamp();
        let claims = TokenClaims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };
        claims
            .sign_with_key(&self.key)
            .map_err(|_| AuthError::SigningFailed)
    }

    /// Проверяет подпись и срок действия; возвращает claims токена.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims: TokenClaims = token
            .verify_with_key(&self.key)
            .map_err(|_| AuthError::InvalidToken)?;

        if claims.exp < Self::current_timestamp() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет выпуск и успешную проверку токена.
    #[test]
    fn test_issue_and_verify() {
        let manager = TokenManager::new("test-secret").unwrap();
        let token = manager.issue("u1", "u1@example.com").unwrap();

        let claims = manager.verify(&token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.email, "u1@example.com");
        assert!(claims.exp > claims.iat);
    }

    /// Тест проверяет, что токен, подписанный другим секретом,
    /// отклоняется.
    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenManager::new("secret-a").unwrap();
        let verifier = TokenManager::new("secret-b").unwrap();
        let token = issuer.issue("u1", "u1@example.com").unwrap();
        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidToken)));
    }

    /// Тест проверяет отклонение истёкшего токена.
    #[test]
    fn test_expired_token_rejected() {
        let manager = TokenManager::with_ttl("test-secret", Duration::ZERO).unwrap();
        let token = manager.issue("u1", "u1@example.com").unwrap();
        // exp == iat, а проверка строгая по прошедшей секунде
        std::thread::sleep(Duration::from_millis(1100));
        assert!(matches!(manager.verify(&token), Err(AuthError::InvalidToken)));
    }

    /// Тест проверяет отклонение искажённого токена.
    #[test]
    fn test_garbage_token_rejected() {
        let manager = TokenManager::new("test-secret").unwrap();
        assert!(matches!(manager.verify("not.a.token"), Err(AuthError::InvalidToken)));
        assert!(matches!(manager.verify(""), Err(AuthError::InvalidToken)));
    }
}
