use std::{io::ErrorKind, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{tcp::OwnedReadHalf, TcpStream},
    sync::Notify,
    time::timeout,
};
use tracing::{debug, info, warn};

use super::{
    http::{self, HttpError, Request},
    RateLimiter,
};
use crate::{
    auth::TokenManager,
    sse::{stream_events, Broker},
};

/// Таймаут чтения стартовой строки и заголовков запроса.
const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Обработчик одного входящего соединения.
///
/// Разбирает запрос, применяет rate limit и аутентификацию, после чего
/// либо отвечает коротким JSON, либо превращает соединение в долгоживущий
/// SSE-поток: регистрирует подписку в брокере и входит в цикл доставки
/// до отключения клиента или остановки сервера.
pub struct ConnectionHandler {
    connection_id: u32,
    socket: TcpStream,
    addr: SocketAddr,
    broker: Broker,
    tokens: Arc<TokenManager>,
    limiter: Arc<RateLimiter>,
    shutdown: Arc<Notify>,
}

impl ConnectionHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connection_id: u32,
        socket: TcpStream,
        addr: SocketAddr,
        broker: Broker,
        tokens: Arc<TokenManager>,
        limiter: Arc<RateLimiter>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            connection_id,
            socket,
            addr,
            broker,
            tokens,
            limiter,
            shutdown,
        }
    }

    /// Основной путь обработки соединения.
    pub async fn run(self) -> Result<()> {
        let ConnectionHandler {
            connection_id,
            socket,
            addr,
            broker,
            tokens,
            limiter,
            shutdown,
        } = self;

        let (read_half, mut writer) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        let request = match timeout(READ_TIMEOUT, http::read_request(&mut reader)).await {
            Ok(Ok(request)) => request,
            Ok(Err(HttpError::UnexpectedEof)) => {
                debug!(connection = connection_id, %addr, "client closed before sending a request");
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(connection = connection_id, %addr, error = %e, "malformed request");
                http::write_json_error(&mut writer, 400, "malformed request", None).await?;
                return Ok(());
            }
            Err(_) => {
                warn!(connection = connection_id, %addr, "request read timeout");
                http::write_json_error(&mut writer, 400, "request timeout", None).await?;
                return Ok(());
            }
        };

        debug!(
            connection = connection_id,
            method = %request.method,
            path = %request.path,
            "request received"
        );

        let origin = request.header("origin").map(String::from);
        let origin = origin.as_deref();

        let client_ip = real_ip(&request, addr);
        if !limiter.allow(client_ip) {
            warn!(connection = connection_id, ip = %client_ip, "rate limit exceeded");
            http::write_json_error(&mut writer, 429, "rate limit exceeded", origin).await?;
            return Ok(());
        }

        // pre-flight запрос браузера перед кросс-доменным EventSource
        if request.method == "OPTIONS" {
            http::write_no_content(&mut writer, origin).await?;
            return Ok(());
        }

        if request.path == "/healthz" {
            if request.method != "GET" {
                http::write_json_error(&mut writer, 405, "method not allowed", origin).await?;
            } else {
                http::write_json(&mut writer, 200, "{\"status\":\"ok\"}", origin).await?;
            }
            return Ok(());
        }

        let Some(topics) = route_topics(&request, &tokens, &mut writer).await? else {
            // ошибка уже записана в ответ
            return Ok(());
        };

        let mut sub = broker.subscribe(topics);
        info!(
            connection = connection_id,
            %addr,
            subscription = sub.id(),
            topics = ?sub.topics(),
            "sse stream established"
        );
        http::write_sse_preamble(&mut writer, origin).await?;

        // Сторож отмены: отключение клиента или остановка сервера.
        let cancel = Arc::new(Notify::new());
        let watchdog = tokio::spawn(watch_disconnect(reader, shutdown, cancel.clone()));

        let result = stream_events(&mut sub, &mut writer, &cancel).await;
        let subscription_id = sub.id();
        drop(sub);
        watchdog.abort();

        if let Err(e) = writer.shutdown().await {
            if e.kind() != ErrorKind::NotConnected {
                debug!(connection = connection_id, error = %e, "error during shutdown");
            }
        }

        match result {
            Ok(()) => {
                info!(
                    connection = connection_id,
                    subscription = subscription_id,
                    "sse stream closed"
                );
                Ok(())
            }
            Err(e) if is_recoverable_error(&e) => {
                debug!(
                    connection = connection_id,
                    subscription = subscription_id,
                    error = %e,
                    "sse stream closed by peer"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Определяет темы подписки по пути запроса, проверяя метод, версию
/// протокола и bearer-токен. `None` — отказ, ответ уже записан.
async fn route_topics<W>(
    request: &Request,
    tokens: &TokenManager,
    writer: &mut W,
) -> Result<Option<Vec<String>>>
where
    W: AsyncWrite + Unpin,
{
    let origin = request.header("origin");

    if !matches!(
        request.path.as_str(),
        "/api/sse/peers" | "/api/sse/invitations" | "/api/sse/activity"
    ) {
        http::write_json_error(writer, 404, "not found", origin).await?;
        return Ok(None);
    }
    if request.method != "GET" {
        http::write_json_error(writer, 405, "method not allowed", origin).await?;
        return Ok(None);
    }
    // HTTP/1.0-клиент не удержит открытый поток — отказ до регистрации.
    if request.version != "HTTP/1.1" {
        http::write_json_error(writer, 505, "streaming not supported", origin).await?;
        return Ok(None);
    }

    if request.header("authorization").is_none() {
        http::write_json_error(writer, 401, "missing authorization header", origin).await?;
        return Ok(None);
    }
    let Some(token) = request.bearer_token() else {
        http::write_json_error(writer, 401, "invalid authorization header format", origin)
            .await?;
        return Ok(None);
    };
    let claims = match tokens.verify(token) {
        Ok(claims) => claims,
        Err(_) => {
            http::write_json_error(writer, 401, "invalid or expired token", origin).await?;
            return Ok(None);
        }
    };

    let topics = match request.path.as_str() {
        "/api/sse/invitations" => vec![format!("user:{}", claims.user_id)],
        path => {
            let Some(network_id) = request.query_param("network_id").filter(|v| !v.is_empty())
            else {
                http::write_json_error(writer, 400, "network_id required", origin).await?;
                return Ok(None);
            };
            let channel = if path == "/api/sse/peers" {
                "peers"
            } else {
                "activity"
            };
            vec![format!("{channel}:{network_id}")]
        }
    };
    Ok(Some(topics))
}

/// IP клиента: первый адрес из `X-Forwarded-For`, иначе адрес сокета.
fn real_ip(request: &Request, addr: SocketAddr) -> std::net::IpAddr {
    request
        .header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| request.header("x-real-ip").and_then(|s| s.trim().parse().ok()))
        .unwrap_or_else(|| addr.ip())
}

/// Следит за читающей половиной установленного SSE-потока: EOF или ошибка
/// чтения означают отключение клиента; остановка сервера приходит через
/// общий `shutdown`. В обоих случаях циклу доставки отправляется
/// `notify_one`, чтобы сигнал не потерялся между точками ожидания.
async fn watch_disconnect(
    mut reader: BufReader<OwnedReadHalf>,
    shutdown: Arc<Notify>,
    cancel: Arc<Notify>,
) {
    let shutdown_fut = shutdown.notified();
    tokio::pin!(shutdown_fut);
    let mut buf = [0u8; 512];

    loop {
        tokio::select! {
            _ = &mut shutdown_fut => break,
            res = reader.read(&mut buf) => match res {
                Ok(0) | Err(_) => break,
                // байты после заголовков SSE-запросу не нужны
                Ok(_) => {}
            }
        }
    }
    cancel.notify_one();
}

fn is_recoverable_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
    )
}
