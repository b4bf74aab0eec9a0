mod client;
mod events_types;
mod error_types;
mod poller;
mod retry;
pub mod supervisor;

pub use client::{BollardDockerClient, DockerClient, EventStream};
pub use events_types::ProxyEvent;
pub use error_types::DockerError;
pub use poller::ContainerPoller;
pub use retry::{with_retry, RetryPolicy, RetryableOperation};
pub use supervisor::{ConnectionSupervisor, Endpoint, SupervisorState};
