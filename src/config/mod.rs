//! Конфигурация сервера из переменных окружения.

pub mod settings;

pub use settings::Settings;
