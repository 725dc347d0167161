use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::TaskError;
use crate::task::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    StatusChanged {
        id: TaskId,
        status: TaskStatus,
        error: Option<TaskError>,
    },
    SizeKnown {
        id: TaskId,
        size: u64,
    },
    Progress {
        id: TaskId,
        transferred: u64,
        total: Option<u64>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::StatusChanged { id, .. }
            | TaskEvent::SizeKnown { id, .. }
            | TaskEvent::Progress { id, .. } => *id,
        }
    }

    pub fn status(&self) -> Option<TaskStatus> {
        match self {
            TaskEvent::StatusChanged { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Receiving end of a queue subscription.
///
/// Events for one task arrive in the order its state changed. The stream
/// ends once the queue and all of its workers are gone.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TaskEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<mpsc::UnboundedSender<TaskEvent>>,
}

impl Subscribers {
    pub(crate) fn add(&mut self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx);
        Subscription { rx }
    }

    /// Fans `event` out, forgetting subscribers that hung up.
    pub(crate) fn publish(&mut self, event: TaskEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let mut subscribers = Subscribers::default();
        let mut first = subscribers.add();
        let mut second = subscribers.add();

        let event = TaskEvent::SizeKnown {
            id: TaskId::new(3),
            size: 10,
        };
        subscribers.publish(event.clone());

        assert_eq!(first.recv().await, Some(event.clone()));
        assert_eq!(second.recv().await, Some(event));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut subscribers = Subscribers::default();
        let kept = subscribers.add();
        drop(subscribers.add());

        subscribers.publish(TaskEvent::SizeKnown {
            id: TaskId::new(1),
            size: 1,
        });

        assert_eq!(subscribers.len(), 1);
        drop(kept);
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let event = TaskEvent::Progress {
            id: TaskId::new(2),
            transferred: 5,
            total: Some(9),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "progress", "id": 2, "transferred": 5, "total": 9})
        );
    }
}
