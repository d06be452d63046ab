use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{mailbox, Event, MailboxSender, Subscription};

/// Запись реестра: набор тем и пишущая сторона ящика одной живой подписки.
struct Registrant {
    topics: Vec<String>,
    tx: MailboxSender,
}

/// Разделяемое состояние брокера. Реестр — единственная общая изменяемая
/// структура; публикации сканируют его под read-блокировкой, регистрация
/// и дерегистрация — под write-блокировкой.
pub(crate) struct BrokerInner {
    registry: RwLock<HashMap<u64, Registrant>>,
    next_id: AtomicU64,
    mailbox_capacity: usize,
    /// Общее количество вызовов `publish`.
    publish_count: AtomicUsize,
    /// Количество событий, отброшенных из-за переполнения ящиков.
    drop_count: AtomicUsize,
}

impl BrokerInner {
    /// Удаляет подписку из реестра. Идемпотентно: повторный вызов для
    /// того же дескриптора — no-op. Дроп sender'а закрывает ящик и
    /// гарантирует, что новых enqueue в эту подписку не будет.
    pub(crate) fn unsubscribe(&self, id: u64) {
        if self.registry.write().remove(&id).is_some() {
            debug!(subscription = id, "subscription removed");
        }
    }
}

/// Брокер событий реального времени.
///
/// Принимает конкурентные публикации из любых контекстов и раздаёт каждое
/// событие во все заинтересованные подписки без блокировки на медленном
/// или мёртвом подписчике. Доставка best-effort: без подтверждений,
/// без повторов, с тихим отбрасыванием при переполнении ящика.
///
/// Дёшев в клонировании (внутри `Arc`); один экземпляр создаётся на
/// старте процесса и явно передаётся всем продюсерам и потребителям.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Создаёт брокер с заданной ёмкостью почтовых ящиков подписок.
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                registry: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                mailbox_capacity: mailbox_capacity.max(1),
                publish_count: AtomicUsize::new(0),
                drop_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Регистрирует новую подписку на фиксированный набор тем.
    ///
    /// Набор тем неизменяем на всё время жизни подписки; чтобы изменить
    /// интересы, создаётся новая подписка. Возвращённый дескриптор при
    /// дропе дерегистрирует подписку ровно один раз — это единственный
    /// путь очистки на любом пути выхода цикла доставки.
    pub fn subscribe<I, S>(&self, topics: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        let (tx, mailbox) = mailbox(self.inner.mailbox_capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        self.inner.registry.write().insert(
            id,
            Registrant {
                topics: topics.clone(),
                tx,
            },
        );
        debug!(subscription = id, topics = ?topics, "subscription registered");

        Subscription::new(id, topics, mailbox, Arc::downgrade(&self.inner))
    }

    /// Публикует событие в тему.
    ///
    /// Сканирует реестр под read-блокировкой (конкурентно с другими
    /// публикациями) и для каждой подписки с подходящей темой выполняет
    /// одну неблокирующую попытку enqueue. Завершается за ограниченное
    /// время независимо от поведения подписчиков; при нуле совпадений —
    /// no-op. Ошибки подписчиков никогда не всплывают к продюсеру.
    pub fn publish(&self, topic: &str, event: Event) {
        self.inner.publish_count.fetch_add(1, Ordering::Relaxed);

        let registry = self.inner.registry.read();
        for (id, registrant) in registry.iter() {
            if registrant.topics.iter().any(|t| t == topic)
                && !registrant.tx.try_push(event.clone())
            {
                self.inner.drop_count.fetch_add(1, Ordering::Relaxed);
                trace!(subscription = id, topic, "mailbox full, event dropped");
            }
        }
    }

    /// Публикация в персональную тему пользователя (`user:<id>`).
    pub fn publish_to_user(&self, user_id: &str, event: Event) {
        self.publish(&format!("user:{user_id}"), event);
    }

    /// Публикация в тему семейства каналов сети (`<channel>:<network_id>`),
    /// например `peers:<id>` или `activity:<id>`.
    pub fn publish_to_network(&self, network_id: &str, channel: &str, event: Event) {
        self.publish(&format!("{channel}:{network_id}"), event);
    }

    /// Текущее количество живых подписок.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Общее количество вызовов `publish`.
    pub fn publish_count(&self) -> usize {
        self.inner.publish_count.load(Ordering::Relaxed)
    }

    /// Количество событий, отброшенных из-за переполнения ящиков.
    pub fn dropped_count(&self) -> usize {
        self.inner.drop_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::super::DEFAULT_MAILBOX_CAPACITY;
    use super::*;

    fn ev(kind: &str) -> Event {
        Event::new(kind, json!({}))
    }

    async fn recv_one(sub: &mut Subscription) -> Event {
        timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timed out")
            .expect("mailbox closed")
    }

    /// Тест проверяет базовую доставку: подписчик получает опубликованное
    /// событие, счётчики обновляются корректно.
    #[tokio::test]
    async fn test_publish_and_receive() {
        let broker = Broker::new(8);
        let mut sub = broker.subscribe(["peers:net1"]);

        broker.publish("peers:net1", ev("peer_joined"));
        let got = recv_one(&mut sub).await;
        assert_eq!(got.kind, "peer_joined");

        assert_eq!(broker.publish_count(), 1);
        assert_eq!(broker.dropped_count(), 0);
    }

    /// Тест проверяет изоляцию тем: подписка на T1 никогда не получает
    /// событие, опубликованное в T2.
    #[tokio::test]
    async fn test_disjoint_topics_do_not_leak() {
        let broker = Broker::new(8);
        let mut sub = broker.subscribe(["peers:net1"]);

        broker.publish("peers:net2", ev("peer_joined"));
        broker.publish("activity:net1", ev("log_added"));
        assert!(sub.try_recv().is_none());

        broker.publish("peers:net1", ev("peer_left"));
        assert_eq!(recv_one(&mut sub).await.kind, "peer_left");
    }

    /// Тест проверяет сохранение порядка публикаций для одной подписки
    /// (без переполнения).
    #[tokio::test]
    async fn test_per_subscription_ordering() {
        let broker = Broker::new(DEFAULT_MAILBOX_CAPACITY);
        let mut sub = broker.subscribe(["t"]);

        for n in 0..DEFAULT_MAILBOX_CAPACITY as u64 {
            broker.publish("t", Event::new("seq", json!({ "n": n })));
        }
        for n in 0..DEFAULT_MAILBOX_CAPACITY as u64 {
            assert_eq!(recv_one(&mut sub).await.payload["n"], n);
        }
    }

    /// Тест проверяет, что публикация в тему без подписчиков — no-op
    /// без ошибок и блокировки.
    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let broker = Broker::new(8);
        broker.publish("nobody:listens", ev("x"));
        assert_eq!(broker.publish_count(), 1);
        assert_eq!(broker.dropped_count(), 0);
        assert_eq!(broker.subscriber_count(), 0);
    }

    /// Тест проверяет независимую доставку: две подписки на одну тему
    /// получают по одной копии события каждая.
    #[tokio::test]
    async fn test_two_subscribers_get_independent_copies() {
        let broker = Broker::new(8);
        let mut a = broker.subscribe(["t"]);
        let mut b = broker.subscribe(["t"]);

        broker.publish("t", ev("once"));

        assert_eq!(recv_one(&mut a).await.kind, "once");
        assert_eq!(recv_one(&mut b).await.kind, "once");
        // вторая копия в ту же подписку не приходит
        assert!(a.try_recv().is_none());
        assert!(b.try_recv().is_none());
    }

    /// Тест проверяет at-most-once при дублирующихся темах подписки:
    /// одно совпадение на publish, даже если тема указана дважды.
    #[tokio::test]
    async fn test_duplicate_topic_delivers_once() {
        let broker = Broker::new(8);
        let mut sub = broker.subscribe(["t", "t"]);

        broker.publish("t", ev("once"));
        assert_eq!(recv_one(&mut sub).await.kind, "once");
        assert!(sub.try_recv().is_none());
    }

    /// Тест проверяет переполнение: 65-е событие при ёмкости 64
    /// отбрасывается, первые 64 остаются доставляемыми.
    #[tokio::test]
    async fn test_overflow_drops_newest() {
        let broker = Broker::new(DEFAULT_MAILBOX_CAPACITY);
        let mut sub = broker.subscribe(["t"]);

        for n in 0..=DEFAULT_MAILBOX_CAPACITY as u64 {
            broker.publish("t", Event::new("seq", json!({ "n": n })));
        }
        assert_eq!(broker.dropped_count(), 1);

        for n in 0..DEFAULT_MAILBOX_CAPACITY as u64 {
            assert_eq!(recv_one(&mut sub).await.payload["n"], n);
        }
        assert!(sub.try_recv().is_none());
    }

    /// Тест проверяет, что после дропа подписки последующая публикация
    /// завершается без ошибок и не воскрешает подписку.
    #[tokio::test]
    async fn test_publish_after_unsubscribe() {
        let broker = Broker::new(8);
        let sub = broker.subscribe(["t"]);
        assert_eq!(broker.subscriber_count(), 1);

        drop(sub);
        assert_eq!(broker.subscriber_count(), 0);

        broker.publish("t", ev("late"));
        assert_eq!(broker.subscriber_count(), 0);
        assert_eq!(broker.dropped_count(), 0);
    }

    /// Тест проверяет идемпотентность дерегистрации.
    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let broker = Broker::new(8);
        let sub = broker.subscribe(["t"]);
        let id = sub.id();
        drop(sub);

        // повторное удаление того же дескриптора — no-op
        broker.inner.unsubscribe(id);
        assert_eq!(broker.subscriber_count(), 0);
    }

    /// Тест проверяет адресный сахар `publish_to_user` /
    /// `publish_to_network` — чистую композицию строк над `publish`.
    #[tokio::test]
    async fn test_addressing_helpers() {
        let broker = Broker::new(8);
        let mut user_sub = broker.subscribe(["user:u1"]);
        let mut net_sub = broker.subscribe(["peers:net1"]);

        broker.publish_to_user("u1", ev("invitation_received"));
        broker.publish_to_network("net1", "peers", ev("member_joined"));

        assert_eq!(recv_one(&mut user_sub).await.kind, "invitation_received");
        assert_eq!(recv_one(&mut net_sub).await.kind, "member_joined");
    }

    /// Тест проверяет, что подписка на несколько тем получает события
    /// каждой из них.
    #[tokio::test]
    async fn test_multi_topic_subscription() {
        let broker = Broker::new(8);
        let mut sub = broker.subscribe(["peers:net1", "activity:net1"]);

        broker.publish("peers:net1", ev("peer_joined"));
        broker.publish("activity:net1", ev("log_added"));

        assert_eq!(recv_one(&mut sub).await.kind, "peer_joined");
        assert_eq!(recv_one(&mut sub).await.kind, "log_added");
    }
}
