use std::{
    collections::HashMap,
    net::IpAddr,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::debug;

/// Конфигурация per-IP ограничителя частоты запросов.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Скорость пополнения, токенов в секунду.
    pub rate_per_sec: f64,
    /// Максимальный накопленный запас (burst).
    pub burst: f64,
    /// Простой, после которого ведро вычищается.
    pub idle_eviction: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 10.0,
            burst: 20.0,
            idle_eviction: Duration::from_secs(600),
        }
    }
}

/// Ведро токенов одного IP.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Ограничитель частоты запросов по IP клиента (token bucket).
///
/// Новый IP начинает с полным запасом `burst`; каждый запрос стоит один
/// токен, запас пополняется пропорционально прошедшему времени.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Пропускает или отклоняет запрос с данного IP.
    pub fn allow(&self, ip: IpAddr) -> bool {
        self.allow_at(ip, Instant::now())
    }

    fn allow_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(ip).or_insert(TokenBucket {
            tokens: self.config.burst,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.rate_per_sec).min(self.config.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Вычищает вёдра IP, не обращавшихся дольше `idle_eviction`.
    /// Возвращает число удалённых записей.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    fn cleanup_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        let idle = self.config.idle_eviction;
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle);
        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed, "evicted idle rate limit buckets");
        }
        removed
    }

    /// Количество отслеживаемых IP (для логов и тестов).
    pub fn tracked_ips(&self) -> usize {
        self.buckets.lock().len()
    }
}
