pub mod node;
pub mod snapshot;

pub use node::{ClusterConfig, NodeId, NodeObservation, NodeRole};
pub use snapshot::ClusterSnapshot;
