use std::sync::Weak;

use super::{broker::BrokerInner, Event, Mailbox};

/// Дескриптор одной живой подписки.
///
/// Владеет читающей стороной почтового ящика; жизнь дескриптора привязана
/// к соединению подписчика. `Drop` дерегистрирует подписку из реестра —
/// ровно один раз, на любом пути выхода (отключение клиента, остановка
/// сервера, закрытие ящика).
pub struct Subscription {
    id: u64,
    topics: Vec<String>,
    mailbox: Mailbox,
    broker: Weak<BrokerInner>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        topics: Vec<String>,
        mailbox: Mailbox,
        broker: Weak<BrokerInner>,
    ) -> Self {
        Self {
            id,
            topics,
            mailbox,
            broker,
        }
    }

    /// Непрозрачный идентификатор подписки в реестре.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Темы, выбранные при создании. Неизменны на всё время жизни.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Ожидает следующее событие; `None` — ящик закрыт, событий больше
    /// не будет.
    pub async fn recv(&mut self) -> Option<Event> {
        self.mailbox.recv().await
    }

    /// Неблокирующее получение уже буферизованного события.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.mailbox.try_recv()
    }

    /// Явная отписка. Аналогично `drop(self)`.
    pub fn unsubscribe(self) {
        // Дерегистрация выполняется в Drop.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.unsubscribe(self.id);
        }
        self.mailbox.close();
    }
}
