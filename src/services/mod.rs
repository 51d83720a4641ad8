pub mod dispatcher;
pub mod registry;
pub mod retry;
pub mod router;

pub use dispatcher::RequestDispatcher;
pub use registry::{Application, InstanceStatus, ServiceInstance, ServiceRegistry};
pub use retry::{RetryLedger, TriggerKind};
pub use router::EurekaRouter;
