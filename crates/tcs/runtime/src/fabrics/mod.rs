//! Shared data fabrics: State Bus and Telemetry Snapshot Store

mod snapshot;
mod state_bus;

pub use snapshot::{Snapshot, SnapshotStore, SnapshotWriter};
pub use state_bus::{
    spawn_subscriber, Mailbox, StateBus, StateSubscriber, SubscriberHandle, SubscriptionTask,
};
