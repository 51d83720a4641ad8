//! Registry store module
//!
//! In-memory application/instance store plus heartbeat bookkeeping:
//! - `types`: instances, applications, heartbeat events
//! - `service`: the concurrent `ServiceRegistry` itself

pub mod service;
pub mod types;

// Re-export public types for easier access
pub use service::ServiceRegistry;
pub use types::{
    Application, DataCenterInfo, HeartbeatEvent, InstanceStatus, ParseStatusError, PortInfo,
    ServiceInstance,
};
