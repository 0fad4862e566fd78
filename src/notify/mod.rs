//! 事件通知：按 topic 发布的即发即忘事件
//!
//! 发布方不关心是否有订阅者；BroadcastNotifier 在无订阅或订阅者落后时直接丢弃。

use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// 子 Agent 事件所在 topic
pub fn subagent_topic(conversation_id: Option<&str>) -> String {
    format!("conversation:{}:subagents", conversation_id.unwrap_or("none"))
}

/// 工作流事件所在 topic
pub fn workflow_topic(workflow_id: &str) -> String {
    format!("workflow:{}", workflow_id)
}

/// 通知器：发布不返回结果，失败静默
pub trait Notifier: Send + Sync {
    fn publish(&self, topic: &str, payload: Value);
}

/// 一条已发布的通知
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub topic: String,
    pub payload: Value,
}

/// 丢弃所有通知
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _topic: &str, _payload: Value) {}
}

/// 基于 tokio broadcast 的通知器
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, topic: &str, payload: Value) {
        // 无订阅者时 send 返回 Err，按约定忽略
        let _ = self.tx.send(Notification {
            topic: topic.to_string(),
            payload,
        });
    }
}

/// 记录所有通知（测试用）
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// 指定 topic 下 payload.event == event 的通知
    pub fn events_named(&self, event: &str) -> Vec<Notification> {
        self.events()
            .into_iter()
            .filter(|n| n.payload.get("event").and_then(Value::as_str) == Some(event))
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, topic: &str, payload: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(Notification {
                topic: topic.to_string(),
                payload,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_to_subscribers_and_drops_otherwise() {
        let notifier = BroadcastNotifier::new(4);
        notifier.publish("t", serde_json::json!({"event": "lost"}));

        let mut rx = notifier.subscribe();
        notifier.publish(&workflow_topic("w1"), serde_json::json!({"event": "x"}));
        let n = rx.recv().await.unwrap();
        assert_eq!(n.topic, "workflow:w1");
        assert_eq!(n.payload["event"], "x");
    }

    #[test]
    fn recording_filters_by_event() {
        let rec = RecordingNotifier::new();
        rec.publish(&subagent_topic(Some("c1")), serde_json::json!({"event": "a"}));
        rec.publish(&subagent_topic(None), serde_json::json!({"event": "b"}));
        assert_eq!(rec.events_named("a")[0].topic, "conversation:c1:subagents");
        assert_eq!(rec.events_named("b")[0].topic, "conversation:none:subagents");
    }
}
