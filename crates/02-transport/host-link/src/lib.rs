//! In-process stand-in for the platform transport between hub and host.
//!
//! [`SimulatedHostLink`] implements [`comms_abi::HostLink`] with a bounded
//! queue, a transport thread and failure injection. [`PowerControlManager`]
//! tracks the host power state the core consults for wakeup blame.

mod config;
mod error;
mod link;
mod metrics;
mod power;

pub use config::{HostLinkConfig, DEFAULT_FLUSH_TIMEOUT_MS, DEFAULT_OUTBOUND_QUEUE_CAPACITY};
pub use error::{LinkError, LinkResult};
pub use link::{HostDelivery, SimulatedHostLink};
pub use metrics::LinkMetricsSnapshot;
pub use power::PowerControlManager;
