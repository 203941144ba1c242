//! The Cluster Coordinator: in-memory controller state, the partition and
//! replica state machines, the control-RPC fan-out batcher, the
//! single-worker event loop, partition reassignment, and the `Coordinator`
//! itself. See DESIGN.md for how each module is grounded.

pub mod batcher;
pub mod context;
pub mod control;
pub mod coordinator;
pub mod event;
pub mod reassignment;
pub mod state_machine;

pub use batcher::RpcBatcher;
pub use context::{ControllerContext, LeaderAndIsr, RecoveryState, ReplicaAssignment, TopicPartition};
pub use control::{
    AlterPartitionRequest, AlterPartitionResponse, LeaderAndIsrPartitionState, LeaderAndIsrRequest, OutboundRpc,
    StopReplicaEpoch, StopReplicaPartition, StopReplicaRequest, UpdateMetadataPartitionState, UpdateMetadataRequest,
};
pub use coordinator::Coordinator;
pub use event::{CoordinatorEvent, EventLoop, EventLoopHandle, HandlerOutcome};
pub use state_machine::{ElectionStrategy, PartitionState, PartitionStateMachine, ReplicaState, ReplicaStateMachine};
