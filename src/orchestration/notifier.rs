use super::collaborators::{StatusNotifier, SubWorkflowStatusEvent};
use crate::models::TaskInstanceId;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// In-process status notifier keyed by parent task instance id.
///
/// Hosts that observe sub-workflow completions in the same process publish
/// here; each orchestrator holds the receiving end for its parent.
#[derive(Debug)]
pub struct InProcessStatusNotifier {
    subscribers: DashMap<TaskInstanceId, mpsc::Sender<SubWorkflowStatusEvent>>,
    capacity: usize,
}

impl InProcessStatusNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Deliver an event to the orchestrator of its parent task instance.
    ///
    /// Returns `false` when nobody is subscribed; the orchestrator recovers
    /// such events through reconciliation.
    pub async fn publish(&self, event: SubWorkflowStatusEvent) -> bool {
        let parent_task_instance_id = event.parent_task_instance_id;
        // Clone the sender out so no map guard is held across the await
        let Some(sender) = self
            .subscribers
            .get(&parent_task_instance_id)
            .map(|entry| entry.value().clone())
        else {
            debug!(
                parent_task_instance_id = parent_task_instance_id,
                index = event.index,
                "No subscriber for status event"
            );
            return false;
        };

        if sender.send(event).await.is_err() {
            warn!(
                parent_task_instance_id = parent_task_instance_id,
                "Subscriber dropped, removing"
            );
            self.subscribers
                .remove_if(&parent_task_instance_id, |_, current| current.same_channel(&sender));
            return false;
        }
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for InProcessStatusNotifier {
    fn default() -> Self {
        Self::new(crate::config::DynamicTaskConfig::default().event_channel_capacity)
    }
}

impl StatusNotifier for InProcessStatusNotifier {
    /// A new subscription replaces any previous one for the same parent
    fn subscribe(
        &self,
        parent_task_instance_id: TaskInstanceId,
    ) -> mpsc::Receiver<SubWorkflowStatusEvent> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers.insert(parent_task_instance_id, sender);
        receiver
    }

    fn unsubscribe(&self, parent_task_instance_id: TaskInstanceId) {
        if self.subscribers.remove(&parent_task_instance_id).is_some() {
            debug!(
                parent_task_instance_id = parent_task_instance_id,
                "Status subscription removed"
            );
        }
    }
}
