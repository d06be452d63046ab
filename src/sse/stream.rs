use std::io;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Notify,
};
use tracing::{debug, warn};

use super::{Event, Subscription};

/// Синтетический heartbeat-кадр, отправляемый сразу после установления
/// подписки: подтверждает живость потока и проталкивает буферизацию
/// транспорта.
pub const PING_FRAME: &[u8] = b"event: ping\n\n";

/// Кодирует событие в текстовый кадр `text/event-stream`:
/// строка `event: <type>`, строка `data: <json>`, пустая строка.
pub fn encode_frame(event: &Event) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {data}\n\n", event.kind))
}

/// Цикл доставки одной подписки.
///
/// Пишет heartbeat, затем ждёт либо сигнала отмены, либо следующего
/// события из ящика. Отмена кооперативная: наблюдается на точке ожидания,
/// кадр в процессе записи не прерывается. Отменяющая сторона обязана
/// использовать `Notify::notify_one`, чтобы сигнал не потерялся, пока
/// цикл занят записью.
///
/// Ошибка сериализации одного события не фатальна: событие
/// логируется и пропускается, цикл и соединение продолжают жить.
/// Возврат из функции (по любой причине) — момент, когда вызывающая
/// сторона дропает `Subscription`, чем дерегистрирует её ровно один раз.
pub async fn stream_events<W>(
    sub: &mut Subscription,
    writer: &mut W,
    cancel: &Notify,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(PING_FRAME).await?;
    writer.flush().await?;

    loop {
        tokio::select! {
            _ = cancel.notified() => {
                debug!(subscription = sub.id(), "delivery cancelled");
                break;
            }
            maybe = sub.recv() => match maybe {
                None => {
                    debug!(subscription = sub.id(), "mailbox closed, delivery finished");
                    break;
                }
                Some(event) => {
                    let frame = match encode_frame(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(kind = %event.kind, error = %e, "failed to encode event, skipping");
                            continue;
                        }
                    };
                    writer.write_all(frame.as_bytes()).await?;
                    writer.flush().await?;
                }
            }
        }
    }

    Ok(())
}
