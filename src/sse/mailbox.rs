use tokio::sync::mpsc;

use super::Event;

/// Ёмкость почтового ящика подписки по умолчанию.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Пишущая сторона почтового ящика. Держится только реестром брокера;
/// когда подписка удаляется из реестра, sender дропается и читатель
/// получает терминальный `None`.
#[derive(Debug, Clone)]
pub(crate) struct MailboxSender {
    tx: mpsc::Sender<Event>,
}

/// Ограниченная FIFO-очередь ожидающих доставки событий одной подписки.
///
/// Один конкурентный писатель (`try_push` со стороны публикаций) и один
/// читатель (цикл доставки). Переполнение — отбрасывание входящего события,
/// содержимое очереди не меняется и продюсер не получает сигнала.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Event>,
}

/// Создаёт почтовый ящик заданной ёмкости (минимум 1).
pub(crate) fn mailbox(capacity: usize) -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailboxSender { tx }, Mailbox { rx })
}

impl MailboxSender {
    /// Неблокирующая попытка положить событие в очередь.
    ///
    /// Возвращает `false`, если событие отброшено: очередь заполнена
    /// либо читатель уже закрыл ящик.
    pub(crate) fn try_push(&self, event: Event) -> bool {
        self.tx.try_send(event).is_ok()
    }
}

impl Mailbox {
    /// Ожидает следующее событие.
    ///
    /// `None` означает, что ящик закрыт (подписка удалена из реестра)
    /// и событий больше не будет.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Неблокирующее получение уже буферизованного события.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Закрывает ящик со стороны читателя. Идемпотентно: последующие
    /// `try_push` возвращают `false`, уже буферизованные события
    /// остаются читаемыми.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
