//! Подсистема рассылки событий в реальном времени (SSE).
//!
//! Этот модуль реализует внутрипроцессный брокер уведомлений: продюсеры
//! публикуют события по темам, а каждое долгоживущее streaming-соединение
//! получает свою независимую копию подходящих событий:
//!
//! - `broker`: реестр живых подписок и точка входа для публикаций.
//! - `event`: структура события с тегом типа и JSON-содержимым.
//! - `mailbox`: ограниченная очередь ожидающих доставки событий одной
//!   подписки.
//! - `subscriber`: дескриптор подписки с гарантированной дерегистрацией.
//! - `stream`: цикл доставки и текстовый wire-формат `text/event-stream`.
//!
//! Публичный API переэкспортирует:
//! - `broker::*`
//! - `event::*`
//! - `mailbox::*`
//! - `subscriber::*`
//! - `stream::*`

pub mod broker;
pub mod event;
pub mod mailbox;
pub mod stream;
pub mod subscriber;

pub use broker::*;
pub use event::*;
pub use mailbox::*;
pub use stream::*;
pub use subscriber::*;
