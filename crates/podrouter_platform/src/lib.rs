//! podrouter Platform - OS-Specific Default Device Routing
//!
//! This crate provides the hardware boundary of the routing engine:
//! - Device enumeration and per-device attribute queries
//! - Reading and writing the system default device for each role
//! - Hardware change notifications (device list, default input/output)
//! - Launch-at-login registration
//!
//! # Platform Support
//!
//! | Platform | Backend    | Default devices | Notifications |
//! |----------|------------|-----------------|---------------|
//! | macOS    | CoreAudio  | Yes             | Yes (HAL)     |
//! | any      | Mock       | In-memory       | Manual        |
//!
//! # Architecture
//!
//! Each backend implements the `AudioHardware` trait. The core engine only
//! ever talks to `dyn AudioHardware`, which keeps the routing policy testable
//! against `MockHardware` on every platform.

mod error;
mod login;
mod traits;

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

pub use error::PlatformError;
pub use login::{LaunchAgent, LoginItem};
pub use mock::{MockDevice, MockHardware};
pub use traits::{
    AttributeValue, AudioHardware, DeviceAttribute, DeviceId, DeviceRole, HardwareEventKind,
    ListenerCallback, SubscriptionId, TransportType,
};

/// Get the hardware backend for the current OS
///
/// Returns a boxed trait object owned by the routing engine.
pub fn get_backend() -> Result<Box<dyn AudioHardware>, PlatformError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::CoreAudioHardware::new()?))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(PlatformError::UnsupportedPlatform)
    }
}

/// Check if the current platform can change system default devices
pub fn supports_default_device_routing() -> bool {
    cfg!(target_os = "macos")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_matches_capabilities() {
        let backend = get_backend();
        assert_eq!(backend.is_ok(), supports_default_device_routing());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_unsupported_platform_error() {
        assert!(matches!(
            get_backend(),
            Err(PlatformError::UnsupportedPlatform)
        ));
    }
}
