//! Platform Error Types

use thiserror::Error;

use crate::traits::{DeviceAttribute, DeviceId, DeviceRole, HardwareEventKind};

/// Errors from platform-specific operations
///
/// Hardware failures carry the raw status code reported by the OS
/// (an `OSStatus` on macOS) so callers can surface it verbatim.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Platform not supported")]
    UnsupportedPlatform,

    #[error("Feature not available on this platform: {0}")]
    FeatureNotAvailable(String),

    #[error("Failed to enumerate devices: OSStatus {status}")]
    EnumerationFailed { status: i32 },

    #[error("Failed to query {attribute:?} of device {device}: OSStatus {status}")]
    QueryFailed {
        device: DeviceId,
        attribute: DeviceAttribute,
        status: i32,
    },

    #[error("Failed to get default {role} device: OSStatus {status}")]
    DefaultDeviceUnavailable { role: DeviceRole, status: i32 },

    #[error("Failed to set default {role} device to {device}: OSStatus {status}")]
    AssignmentFailed {
        role: DeviceRole,
        device: DeviceId,
        status: i32,
    },

    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("Failed to subscribe to {kind:?}: OSStatus {status}")]
    SubscriptionFailed { kind: HardwareEventKind, status: i32 },

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(u64),

    #[error("Backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    /// Raw OS status code, when the failure came from the hardware layer
    pub fn status(&self) -> Option<i32> {
        match self {
            PlatformError::EnumerationFailed { status }
            | PlatformError::QueryFailed { status, .. }
            | PlatformError::DefaultDeviceUnavailable { status, .. }
            | PlatformError::AssignmentFailed { status, .. }
            | PlatformError::SubscriptionFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
