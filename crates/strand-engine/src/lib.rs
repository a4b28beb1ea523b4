//! Node actors and the tree-structured executor.
//!
//! A [`NodeActor`] wraps one compiled node for one run and owns its state and
//! lifecycle. An [`Executor`] drives actors through the graph, forking child
//! executors for parallel successors and persisting the whole tree through
//! the configured state storage.

pub mod actor;
pub mod executor;
pub mod routing;
pub mod status;

pub use actor::{ActorResult, ActorSnapshot, NodeActor, StatusReport};
pub use executor::{
    BranchFailure, Executor, ExecutorContext, ExecutorInput, ExecutorOutput, ExecutorState,
    ExecutorStatus, JoinReport, Snapshot,
};
pub use status::NodeActorStatus;
