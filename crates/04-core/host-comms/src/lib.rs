//! Host communications core.
//!
//! Moves messages between nanoapps and the host through a fixed pool of
//! slots shared by both directions:
//! * outbound: validated, pooled and handed to the [`comms_abi::HostLink`];
//!   released once the link reports completion, with the nanoapp's free
//!   callback run on its own event loop.
//! * inbound: copied into the pool and posted to the destination nanoapp,
//!   or deferred onto the system loop until pending loads have drained.
//!
//! The first message that wakes the host blames its sender, once per wake cycle.

mod blame;
mod completion;
mod config;
mod error;
mod inbound;
mod manager;
pub mod message_pool;
mod metrics;
mod outbound;


pub use blame::WakeupBlame;
pub use config::{HostCommsConfig, DEFAULT_MAX_OUTSTANDING_MESSAGES};
pub use error::{PoolError, PoolResult, SendError, SendRejected};
pub use manager::{HostCommsManager, HostCommsManagerBuilder};
pub use message_pool::MessagePool;
pub use metrics::CommsMetricsSnapshot;
