//! Сетевой слой поверх tokio TCP.
//!
//! Модуль принимает соединения, разбирает HTTP-запрос, применяет rate
//! limit и аутентификацию и превращает подходящие запросы в долгоживущие
//! SSE-потоки, привязанные к подпискам брокера.
//!
//! Состав:
//! - `server` — приём соединений, лимит одновременных клиентов,
//!   graceful shutdown;
//! - `connection` — обработка одного клиента: маршрутизация, авторизация,
//!   цикл доставки;
//! - `http` — минимальный разбор запросов и запись ответов;
//! - `ratelimit` — token bucket по IP клиента.

pub mod connection;
pub mod http;
pub mod ratelimit;
pub mod server;

pub use connection::ConnectionHandler;
pub use http::{HttpError, Request};
pub use ratelimit::{RateLimitConfig, RateLimiter};
