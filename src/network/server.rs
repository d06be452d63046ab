use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{bail, Context, Result};
use tokio::{
    net::TcpListener,
    sync::{Notify, Semaphore},
    time::{sleep, Instant},
};
use tracing::{debug, info, warn};

use super::{ConnectionHandler, RateLimitConfig, RateLimiter};
use crate::{auth::TokenManager, config::Settings, sse::Broker};

/// Период вычищения простаивающих вёдер ограничителя.
const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
/// Шаг опроса активных соединений при остановке.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Запускает сервер с собственным брокером.
pub async fn run(settings: Settings) -> Result<()> {
    let broker = Broker::new(settings.mailbox_capacity);
    run_with_broker(settings, broker).await
}

/// Запускает сервер поверх уже существующего брокера. Используется, когда
/// события публикует не только сеть, но и остальная часть приложения.
pub async fn run_with_broker(settings: Settings, broker: Broker) -> Result<()> {
    let tokens = Arc::new(
        TokenManager::new(&settings.jwt_secret).context("failed to initialize token manager")?,
    );
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        rate_per_sec: settings.rate_limit_per_sec,
        burst: settings.rate_limit_burst,
        ..RateLimitConfig::default()
    }));

    let listener = TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_addr))?;
    info!("listening on {}", settings.listen_addr);

    let shutdown = Arc::new(Notify::new());
    let semaphore = Arc::new(Semaphore::new(settings.max_connections));
    let active = Arc::new(AtomicUsize::new(0));
    let mut connection_counter: u32 = 0;

    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        loop {
            sleep(LIMITER_CLEANUP_INTERVAL).await;
            cleanup_limiter.cleanup();
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                break;
            }
            accepted = listener.accept() => {
                let (socket, addr) = accepted.context("failed to accept connection")?;
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    warn!(%addr, "connection limit reached, rejecting");
                    continue;
                };

                connection_counter = connection_counter.wrapping_add(1);
                let connection_id = connection_counter;
                let handler = ConnectionHandler::new(
                    connection_id,
                    socket,
                    addr,
                    broker.clone(),
                    tokens.clone(),
                    limiter.clone(),
                    shutdown.clone(),
                );

                let active = active.clone();
                active.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handler.run().await {
                        debug!(connection = connection_id, %addr, error = %e, "connection closed with error");
                    }
                    active.fetch_sub(1, Ordering::Relaxed);
                });
            }
        }
    }

    shutdown.notify_waiters();
    wait_for_connections(&active, settings.shutdown_grace()).await?;
    info!(
        subscribers = broker.subscriber_count(),
        published = broker.publish_count(),
        dropped = broker.dropped_count(),
        "server stopped"
    );
    Ok(())
}

/// Ждёт завершения активных соединений в пределах льготного периода.
async fn wait_for_connections(active: &AtomicUsize, grace: Duration) -> Result<()> {
    let deadline = Instant::now() + grace;
    loop {
        let remaining = active.load(Ordering::Relaxed);
        if remaining == 0 {
            info!("all connections closed gracefully");
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("shutdown grace period exceeded, {remaining} connections still active");
        }
        sleep(SHUTDOWN_POLL_INTERVAL).await;
    }
}
