use crate::domain::model::WebEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// 生命週期通知的廣播; 送出不會阻塞, 也不會讓送出者失敗
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<WebEvent>,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WebEvent> {
        self.sender.subscribe()
    }

    pub fn send(&self, event: WebEvent) {
        trace!(
            "Event {} for {} ({})",
            event.phase,
            event.module,
            event.context_path
        );
        // 沒有訂閱者時直接丟棄
        let _ = self.sender.send(event);
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// 取出目前已送達的所有事件
pub fn drain(receiver: &mut broadcast::Receiver<WebEvent>) -> Vec<WebEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                trace!("Event receiver lagged, {} event(s) skipped", skipped);
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ModuleRef, WebEventPhase};

    #[test]
    fn test_send_without_subscribers() {
        let dispatcher = EventDispatcher::new(4);
        let module = ModuleRef::new(1, "a", "1.0.0");
        dispatcher.send(WebEvent::new(&module, "/a", WebEventPhase::Deploying));
    }

    #[test]
    fn test_subscriber_receives_events() {
        let dispatcher = EventDispatcher::new(4);
        let mut receiver = dispatcher.subscribe();
        let module = ModuleRef::new(1, "a", "1.0.0");
        dispatcher.send(WebEvent::new(&module, "/a", WebEventPhase::Deploying));
        dispatcher.send(WebEvent::new(&module, "/a", WebEventPhase::Deployed));

        let first = tokio_test::block_on(receiver.recv()).unwrap();
        assert_eq!(first.phase, WebEventPhase::Deploying);
        let rest = drain(&mut receiver);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].phase, WebEventPhase::Deployed);
    }
}
