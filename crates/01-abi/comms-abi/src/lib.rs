//! ABI types shared between the host communications core and its collaborators.
//!
//! This crate defines the protocol boundary between the core (layer 04), the
//! host link transport (layer 02) and the nanoapp event loops (layer 03). It
//! carries no behaviour beyond small helpers on the shared types:
//! * [`HostMessage`] – one message in either direction, tagged by [`HostMessageData`].
//! * [`Event`] – unit of work posted to a nanoapp through an event loop.
//! * [`HostLink`], [`HostCommsIngress`], [`EventLoopPort`], [`PowerControl`] –
//!   the narrow contracts each side relies on.

mod event;
mod message;
mod nanoapp;
mod ports;

pub use event::{Event, EventData, EventFreeFn};
pub use message::{
    FromHostData, HostMessage, HostMessageData, MessageHandle, OutboundMessage, ToHostData,
};
pub use nanoapp::NanoappInfo;
pub use ports::{
    EventLoopPort, HostCommsIngress, HostLink, InboundError, InboundOutcome, MessageFreeFn,
    PowerControl, SystemCallback, SystemCallbackType,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique nanoapp identifier.
pub type AppId = u64;

/// Identifier assigned to a nanoapp instance when its load request is processed.
pub type InstanceId = u16;

/// Instance id used as the sender of events produced by the runtime itself.
pub const SYSTEM_INSTANCE_ID: InstanceId = 0;

/// Event type delivered to a nanoapp for every message received from the host.
pub const EVENT_MESSAGE_FROM_HOST: u16 = 0x0001;

/// Largest payload a nanoapp may send to the host, in bytes.
pub const MESSAGE_TO_HOST_MAX_SIZE: usize = 4096;

/// Logical identifier of a client on the host side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostEndpoint(pub u16);

impl HostEndpoint {
    /// Only valid for messages from the host: the sender is not specified.
    pub const UNSPECIFIED: HostEndpoint = HostEndpoint(0xFFFE);
    /// Only valid for messages to the host: deliver to every registered client.
    pub const BROADCAST: HostEndpoint = HostEndpoint(0xFFFF);

    /// Returns true for the broadcast sentinel.
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Bitmask of Android permissions declared by a nanoapp or covering a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions(pub u32);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const AUDIO: Permissions = Permissions(1 << 0);
    pub const GNSS: Permissions = Permissions(1 << 1);
    pub const WIFI: Permissions = Permissions(1 << 2);
    pub const WWAN: Permissions = Permissions(1 << 3);

    /// Returns true when every bit of `other` is also set in `self`.
    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both masks.
    pub fn union(self, other: Permissions) -> Permissions {
        Permissions(self.0 | other.0)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        self.union(rhs)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
