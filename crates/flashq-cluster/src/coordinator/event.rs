//! Single-threaded coordinator event loop: a tagged enum of event kinds
//! consumed in strict enqueue order from a bounded channel, each producing a
//! `HandlerOutcome` rather than throwing (the typed analogue of the
//! "CoordinatorMoved" exception design note).

use crate::coordinator::context::TopicPartition;
use crate::coordinator::control::OutboundRpc;
use crate::types::BrokerId;
use tokio::sync::{mpsc, oneshot};

/// One admin/metadata-store/timer/RPC-response notification the event loop
/// processes. Every variant that a caller awaits a reply to carries a
/// `oneshot::Sender` the handler (or the `preempt` hook) replies on exactly
/// once.
pub enum CoordinatorEvent {
    BrokerSetChange {
        added: Vec<BrokerId>,
        removed: Vec<BrokerId>,
    },
    BrokerMetadataChange {
        broker: BrokerId,
    },
    TopicAdded {
        topic: String,
        replicas_per_partition: Vec<Vec<BrokerId>>,
        reply: oneshot::Sender<Result<(), crate::ClusterError>>,
    },
    TopicRemoved {
        topic: String,
    },
    PartitionCountChanged {
        topic: String,
        new_partition_count: u32,
        reply: oneshot::Sender<Result<(), crate::ClusterError>>,
    },
    TopicDeletionRequested {
        topic: String,
        reply: oneshot::Sender<Result<(), crate::ClusterError>>,
    },
    PartitionReassignment {
        tp: TopicPartition,
        target_replicas: Vec<BrokerId>,
        reply: oneshot::Sender<Result<(), crate::ClusterError>>,
    },
    IsrChangeNotification {
        tp: TopicPartition,
    },
    PreferredLeaderElectionRequested {
        partitions: Vec<TopicPartition>,
        reply: oneshot::Sender<Result<(), crate::ClusterError>>,
    },
    ControlledShutdownRequested {
        broker: BrokerId,
        reply: oneshot::Sender<Result<(), crate::ClusterError>>,
    },
    AlterPartitionRequest {
        request: crate::coordinator::control::AlterPartitionRequest,
        reply: oneshot::Sender<crate::coordinator::control::AlterPartitionResponse>,
    },
    UpdateFeatures,
    AllocateProducerIds {
        broker: BrokerId,
        count: u32,
        reply: oneshot::Sender<Result<u64, crate::ClusterError>>,
    },
    ControllerChange,
    ReElect,
    SessionExpired,
    Startup,
    Shutdown,
}

impl CoordinatorEvent {
    /// Invoked by the event loop when the coordinator is resigning with this
    /// event still queued: replies `NotController` to any waiting caller
    /// instead of silently dropping the sender.
    pub fn preempt(self) {
        let not_controller = || crate::ClusterError::NotController {
            context: "coordinator resigned while event was queued".to_string(),
        };
        match self {
            CoordinatorEvent::TopicAdded { reply, .. } => {
                let _ = reply.send(Err(not_controller()));
            }
            CoordinatorEvent::PartitionCountChanged { reply, .. } => {
                let _ = reply.send(Err(not_controller()));
            }
            CoordinatorEvent::TopicDeletionRequested { reply, .. } => {
                let _ = reply.send(Err(not_controller()));
            }
            CoordinatorEvent::PartitionReassignment { reply, .. } => {
                let _ = reply.send(Err(not_controller()));
            }
            CoordinatorEvent::PreferredLeaderElectionRequested { reply, .. } => {
                let _ = reply.send(Err(not_controller()));
            }
            CoordinatorEvent::ControlledShutdownRequested { reply, .. } => {
                let _ = reply.send(Err(not_controller()));
            }
            CoordinatorEvent::AlterPartitionRequest { reply, .. } => {
                let _ = reply.send(crate::coordinator::control::AlterPartitionResponse::Error(
                    not_controller(),
                ));
            }
            CoordinatorEvent::AllocateProducerIds { reply, .. } => {
                let _ = reply.send(Err(not_controller()));
            }
            CoordinatorEvent::BrokerSetChange { .. }
            | CoordinatorEvent::BrokerMetadataChange { .. }
            | CoordinatorEvent::TopicRemoved { .. }
            | CoordinatorEvent::IsrChangeNotification { .. }
            | CoordinatorEvent::UpdateFeatures
            | CoordinatorEvent::ControllerChange
            | CoordinatorEvent::ReElect
            | CoordinatorEvent::SessionExpired
            | CoordinatorEvent::Startup
            | CoordinatorEvent::Shutdown => {}
        }
    }
}

/// Outcome of a single handler invocation: any outbound control RPCs queued
/// by the handler, plus whether the coordinator must resign as a result.
#[derive(Default)]
pub struct HandlerOutcome {
    pub outbound: Vec<OutboundRpc>,
    pub must_resign: bool,
}

/// Thin queue wrapper: the coordinator owns the receiving end and feeds each
/// event to its own `handle` method one at a time. Kept as a separate type
/// (rather than inlining `mpsc::Receiver` into `Coordinator`) so the
/// single-worker discipline in §5 is visible at the type level: only
/// `EventLoop::run` ever pulls from the channel.
pub struct EventLoop {
    receiver: mpsc::Receiver<CoordinatorEvent>,
}

pub struct EventLoopHandle {
    sender: mpsc::Sender<CoordinatorEvent>,
}

impl EventLoopHandle {
    pub async fn send(&self, event: CoordinatorEvent) -> Result<(), mpsc::error::SendError<CoordinatorEvent>> {
        self.sender.send(event).await
    }
}

impl Clone for EventLoopHandle {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl EventLoop {
    pub fn bounded(capacity: usize) -> (EventLoopHandle, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (EventLoopHandle { sender }, Self { receiver })
    }

    /// Pulls the next event, or `None` once every handle has been dropped.
    pub async fn recv(&mut self) -> Option<CoordinatorEvent> {
        self.receiver.recv().await
    }

    /// Drains every currently queued event through `preempt`, used when the
    /// coordinator resigns mid-run so no caller is left waiting forever.
    pub fn preempt_all(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            event.preempt();
        }
    }
}
