//! Minimal nanoapp event loop.
//!
//! Each [`EventLoop`] owns a FIFO task queue and the nanoapps loaded on it.
//! [`EventLoopHandle`] is the cross-thread side and implements
//! [`comms_abi::EventLoopPort`] for the host comms core.

mod config;
mod error;
mod event_loop;
mod metrics;
mod nanoapp;

pub use config::{EventLoopConfig, DEFAULT_EVENT_QUEUE_CAPACITY};
pub use error::{LoopError, LoopResult};
pub use event_loop::{EventLoop, EventLoopHandle};
pub use metrics::LoopMetricsSnapshot;
pub use nanoapp::{Nanoapp, NanoappContext};
