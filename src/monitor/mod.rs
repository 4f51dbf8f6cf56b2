pub mod monitor_loop;
pub mod primary_handler;
pub mod replica_handler;

pub use monitor_loop::MonitorLoop;
pub use primary_handler::PrimaryHandler;
pub use replica_handler::ReplicaHandler;
