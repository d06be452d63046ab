use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Событие, публикуемое в брокер и доставляемое подписчикам.
///
/// Состоит из короткого тега типа (например `"peer_joined"`) и произвольного
/// JSON-содержимого. Ядро не накладывает на payload никакой схемы.
/// Событие создаётся один раз при публикации и клонируется для каждой
/// подходящей подписки.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Тег типа события.
    #[serde(rename = "type")]
    pub kind: String,
    /// Сериализуемое содержимое события.
    pub payload: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Тест проверяет создание события с тегом и JSON-payload.
    #[test]
    fn test_event_creation() {
        let ev = Event::new("peer_joined", json!({"virtual_ip": "10.10.0.2"}));
        assert_eq!(ev.kind, "peer_joined");
        assert_eq!(ev.payload["virtual_ip"], "10.10.0.2");
    }

    /// Тест проверяет, что событие сериализуется в один JSON-объект
    /// с полями `type` и `payload`.
    #[test]
    fn test_event_serializes_with_type_tag() {
        let ev = Event::new("invitation_received", json!({"invitation_id": "inv-1"}));
        let text = serde_json::to_string(&ev).unwrap();
        let decoded: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded["type"], "invitation_received");
        assert_eq!(decoded["payload"]["invitation_id"], "inv-1");
    }

    /// Тест проверяет round-trip сериализации: `type` восстанавливается
    /// в поле `kind`.
    #[test]
    fn test_event_roundtrip() {
        let ev = Event::new("peer_left", json!({"peer_id": 7}));
        let text = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ev);
    }

    /// Тест проверяет событие с пустым payload (null).
    #[test]
    fn test_event_with_null_payload() {
        let ev = Event::new("ping", Value::Null);
        assert_eq!(ev.payload, Value::Null);
    }
}
