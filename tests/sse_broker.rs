use std::{sync::Arc, time::Duration};

use serde_json::json;
use tokio::time::timeout;

use wgcloud::{Broker, Event};

/// Тест проверяет реальный сценарий использования:
/// подписчики на разные сети собирают события в отдельных задачах,
/// рассылка достигает только своих адресатов.
#[tokio::test]
async fn test_real_world_usage_example() {
    let broker = Arc::new(Broker::new(64));

    let mut peers_sub = broker.subscribe(["peers:net1"]);
    let mut user_sub = broker.subscribe(["user:u42"]);

    // Задача оператора сети: ждёт события пиров net1
    let peers_task = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..2 {
            match timeout(Duration::from_secs(2), peers_sub.recv()).await {
                Ok(Some(event)) => seen.push(event.kind),
                _ => break,
            }
        }
        seen
    });

    // Задача пользователя: ждёт одно приглашение
    let user_task = tokio::spawn(async move {
        timeout(Duration::from_secs(2), user_sub.recv())
            .await
            .ok()
            .flatten()
    });

    tokio::task::yield_now().await;

    broker.publish_to_network(
        "net1",
        "peers",
        Event::new("peer_joined", json!({"virtual_ip": "10.10.0.2"})),
    );
    broker.publish_to_network(
        "net1",
        "peers",
        Event::new("peer_left", json!({"virtual_ip": "10.10.0.3"})),
    );
    // чужая сеть не должна дойти ни до кого из подписчиков
    broker.publish_to_network(
        "net2",
        "peers",
        Event::new("peer_joined", json!({"virtual_ip": "10.20.0.1"})),
    );
    broker.publish_to_user(
        "u42",
        Event::new("invitation_received", json!({"network_name": "home"})),
    );

    let peers_seen = peers_task.await.unwrap();
    assert_eq!(peers_seen, vec!["peer_joined", "peer_left"]);

    let invitation = user_task.await.unwrap().expect("invitation not delivered");
    assert_eq!(invitation.kind, "invitation_received");
    assert_eq!(invitation.payload["network_name"], "home");

    assert_eq!(broker.publish_count(), 4);
    assert_eq!(broker.dropped_count(), 0);
}

/// Тест проверяет конкурентную публикацию из многих задач:
/// при достаточной ёмкости почтового ящика подписчик получает все
/// события без потерь.
#[tokio::test]
async fn test_concurrent_publishers() {
    let broker = Arc::new(Broker::new(1024));
    let mut sub = broker.subscribe(["activity:net1"]);

    let mut publishers = Vec::new();
    for worker in 0..8 {
        let broker = broker.clone();
        publishers.push(tokio::spawn(async move {
            for i in 0..50 {
                broker.publish_to_network(
                    "net1",
                    "activity",
                    Event::new("member_joined", json!({"worker": worker, "seq": i})),
                );
                tokio::task::yield_now().await;
            }
        }));
    }
    for publisher in publishers {
        publisher.await.unwrap();
    }

    let mut received = 0;
    while timeout(Duration::from_millis(200), sub.recv())
        .await
        .ok()
        .flatten()
        .is_some()
    {
        received += 1;
    }
    assert_eq!(received, 400);
    assert_eq!(broker.publish_count(), 400);
    assert_eq!(broker.dropped_count(), 0);
}

/// Тест проверяет жизненный цикл подписки: после сброса хендла
/// публикации перестают доставляться, а реестр пустеет.
#[tokio::test]
async fn test_subscription_lifecycle() {
    let broker = Broker::new(8);

    let sub = broker.subscribe(["user:u1"]);
    assert_eq!(broker.subscriber_count(), 1);

    drop(sub);
    assert_eq!(broker.subscriber_count(), 0);

    // публикация без подписчиков — штатный no-op
    broker.publish_to_user("u1", Event::new("invitation_received", json!({})));
    assert_eq!(broker.dropped_count(), 0);
}
