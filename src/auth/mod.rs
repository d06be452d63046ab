//! Аутентификация по bearer-токенам.
//!
//! Токен — HMAC-SHA256-подписанные claims с идентификатором пользователя,
//! email и сроком действия. Маршрутизирующий слой извлекает токен из
//! заголовка `Authorization` и через [`TokenManager`] получает личность
//! вызывающего; ядро брокера о токенах ничего не знает.

pub mod tokens;

pub use tokens::{AuthError, TokenClaims, TokenManager};
