use std::{collections::HashMap, io};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Предел длины одной строки запроса/заголовка.
const MAX_LINE_LEN: usize = 8192;
/// Предел количества заголовков в запросе.
const MAX_HEADERS: usize = 64;

/// Источники, которым разрешён кросс-доменный доступ из браузера.
const ALLOWED_ORIGINS: &[&str] = &[
    "https://mesh.networkershome.com",
    "http://localhost:5173",
    "http://localhost:8080",
    "http://localhost:3000",
];

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("malformed request line")]
    BadRequestLine,

    #[error("malformed header line")]
    BadHeader,

    #[error("request line or header too long")]
    LineTooLong,

    #[error("too many headers")]
    TooManyHeaders,

    #[error("connection closed before request was complete")]
    UnexpectedEof,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Разобранный HTTP-запрос: стартовая строка, query-параметры и заголовки.
/// Тело не читается — SSE-эндпоинтам оно не нужно.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl Request {
    /// Значение query-параметра, если он присутствует.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Значение заголовка (имя регистронезависимо).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Извлекает bearer-токен из заголовка `Authorization`.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
            Some(token.trim())
        } else {
            None
        }
    }
}

/// Читает и разбирает запрос до пустой строки, завершающей заголовки.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = read_line(reader).await?.ok_or(HttpError::UnexpectedEof)?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(HttpError::BadRequestLine)?.to_string();
    let target = parts.next().ok_or(HttpError::BadRequestLine)?;
    let version = parts.next().ok_or(HttpError::BadRequestLine)?.to_string();
    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(HttpError::BadRequestLine);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, raw)) => (path.to_string(), parse_query(raw)),
        None => (target.to_string(), HashMap::new()),
    };

    let mut headers = HashMap::new();
    loop {
        let line = read_line(reader).await?.ok_or(HttpError::UnexpectedEof)?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(HttpError::TooManyHeaders);
        }
        let (name, value) = line.split_once(':').ok_or(HttpError::BadHeader)?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok(Request {
        method,
        path,
        version,
        query,
        headers,
    })
}

/// Читает одну строку, отбрасывая `\r\n`/`\n`. `None` — поток закрыт.
///
/// Чтение идёт через `take`, поэтому строка длиннее предела не
/// буферизуется целиком: как только лимит достигнут без перевода
/// строки, возвращается `LineTooLong`.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if n > MAX_LINE_LEN {
        return Err(HttpError::LineTooLong);
    }

    let mut line = String::from_utf8(buf)
        .map_err(|e| HttpError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// CORS-заголовки ответа. `Allow-Origin` ставится только для источников
/// из списка разрешённых; остальные заголовки — безусловно.
fn cors_headers(origin: Option<&str>) -> String {
    let mut headers = String::new();
    if let Some(origin) = origin.filter(|o| ALLOWED_ORIGINS.contains(o)) {
        headers.push_str("Access-Control-Allow-Origin: ");
        headers.push_str(origin);
        headers.push_str("\r\n");
    }
    headers.push_str(
        "Access-Control-Allow-Methods: GET, OPTIONS\r\n\
         Access-Control-Allow-Headers: Accept, Authorization, Content-Type, X-Requested-With\r\n\
         Access-Control-Allow-Credentials: true\r\n\
         Access-Control-Max-Age: 86400\r\n\
         Vary: Origin\r\n",
    );
    headers
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

/// Пишет JSON-ответ с заданным статусом и закрывает соединение.
pub async fn write_json<W>(
    writer: &mut W,
    status: u16,
    body: &str,
    origin: Option<&str>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{body}",
        reason_phrase(status),
        body.len(),
        cors_headers(origin),
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

/// Пишет JSON-ошибку вида `{"error": "..."}`.
pub async fn write_json_error<W>(
    writer: &mut W,
    status: u16,
    message: &str,
    origin: Option<&str>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::json!({ "error": message }).to_string();
    write_json(writer, status, &body, origin).await
}

/// Пишет ответ на pre-flight OPTIONS: 204 без тела, только CORS-заголовки.
pub async fn write_no_content<W>(writer: &mut W, origin: Option<&str>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 204 No Content\r\n{}Connection: close\r\n\r\n",
        cors_headers(origin),
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

/// Пишет преамбулу SSE-ответа: статус 200 и заголовки потока.
pub async fn write_sse_preamble<W>(writer: &mut W, origin: Option<&str>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/event-stream\r\n\
         Cache-Control: no-cache\r\n\
         Connection: keep-alive\r\n\
         X-Accel-Buffering: no\r\n\
         {}\r\n",
        cors_headers(origin),
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}
