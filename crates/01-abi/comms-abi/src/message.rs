//! Message metadata exchanged between nanoapps and the host.

use std::sync::Arc;

use crate::{AppId, HostEndpoint, Permissions};

/// Fields describing a message received from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FromHostData {
    /// Application-defined message identifier.
    pub message_type: u32,
    /// Host-side entity that sent the message.
    pub host_endpoint: HostEndpoint,
}

/// Fields describing a message sent by a nanoapp to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToHostData {
    /// Application-defined message identifier.
    pub message_type: u32,
    /// Permissions declared by the sending nanoapp; superset of `message_permissions`.
    pub app_permissions: Permissions,
    /// Permissions covering the contents of this message.
    pub message_permissions: Permissions,
    /// Destination client on the host, or [`HostEndpoint::BROADCAST`].
    pub host_endpoint: HostEndpoint,
    /// True if transmitting this message brought the host out of suspend.
    pub woke_host: bool,
}

/// Direction-specific metadata. Exactly one variant exists per message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostMessageData {
    FromHost(FromHostData),
    ToHost(ToHostData),
}

/// A message either to or from the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostMessage {
    /// Source (to host) or destination (from host) nanoapp.
    pub app_id: AppId,
    /// Application-defined payload.
    pub message: Vec<u8>,
    pub data: HostMessageData,
}

impl HostMessage {
    /// Builds a message addressed to nanoapp `app_id` from the host.
    pub fn from_host(app_id: AppId, data: FromHostData, message: Vec<u8>) -> Self {
        Self {
            app_id,
            message,
            data: HostMessageData::FromHost(data),
        }
    }

    /// Builds a message sent by nanoapp `app_id` to the host.
    pub fn to_host(app_id: AppId, data: ToHostData, message: Vec<u8>) -> Self {
        Self {
            app_id,
            message,
            data: HostMessageData::ToHost(data),
        }
    }

    pub fn from_host_data(&self) -> Option<&FromHostData> {
        match &self.data {
            HostMessageData::FromHost(data) => Some(data),
            HostMessageData::ToHost(_) => None,
        }
    }

    pub fn to_host_data(&self) -> Option<&ToHostData> {
        match &self.data {
            HostMessageData::ToHost(data) => Some(data),
            HostMessageData::FromHost(_) => None,
        }
    }

    /// Application-defined message type regardless of direction.
    pub fn message_type(&self) -> u32 {
        match &self.data {
            HostMessageData::FromHost(data) => data.message_type,
            HostMessageData::ToHost(data) => data.message_type,
        }
    }

    /// Host endpoint regardless of direction.
    pub fn host_endpoint(&self) -> HostEndpoint {
        match &self.data {
            HostMessageData::FromHost(data) => data.host_endpoint,
            HostMessageData::ToHost(data) => data.host_endpoint,
        }
    }

    /// Payload length in bytes.
    pub fn message_size(&self) -> usize {
        self.message.len()
    }
}

/// Identifies one allocation in the message pool.
///
/// The generation changes every time the slot is handed out, so a handle kept
/// past its release can never alias a later message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub slot: u32,
    pub generation: u32,
}

/// A message handed to the host link for transmission.
///
/// The link keeps the `Arc` only while transmitting; it must drop its
/// reference before (or while) reporting completion for `handle`.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub handle: MessageHandle,
    pub message: Arc<HostMessage>,
}

impl OutboundMessage {
    /// Metadata for the to-host direction.
    ///
    /// Messages built by the outbound path always carry [`HostMessageData::ToHost`].
    pub fn to_host_data(&self) -> Option<&ToHostData> {
        self.message.to_host_data()
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.message
    }
}
