//! macOS Platform Backend - CoreAudio HAL
//!
//! Default-device routing goes through the system audio object
//! (`kAudioObjectSystemObject`) selectors:
//!
//! ```text
//! Output        → kAudioHardwarePropertyDefaultOutputDevice
//! SystemOutput  → kAudioHardwarePropertyDefaultSystemOutputDevice
//! Input         → kAudioHardwarePropertyDefaultInputDevice
//! ```
//!
//! Hardware notifications are C property listeners registered on the same
//! object. The HAL invokes them on its own thread; the registered callback
//! only forwards the event kind.

pub mod coreaudio;

use std::collections::HashMap;
use std::ffi::c_void;

use coreaudio_sys::{
    kAudioDevicePropertyDeviceIsAlive, kAudioDevicePropertyDeviceNameCFString,
    kAudioDevicePropertyStreams, kAudioDevicePropertyTransportType,
    kAudioHardwarePropertyDefaultInputDevice, kAudioHardwarePropertyDefaultOutputDevice,
    kAudioHardwarePropertyDefaultSystemOutputDevice, kAudioHardwarePropertyDevices,
    kAudioObjectPropertyName, kAudioObjectPropertyScopeGlobal, kAudioObjectPropertyScopeInput,
    kAudioObjectPropertyScopeOutput, kAudioObjectSystemObject, AudioObjectAddPropertyListener,
    AudioObjectID, AudioObjectPropertyAddress, AudioObjectPropertySelector,
    AudioObjectRemovePropertyListener, OSStatus,
};
use tracing::{debug, info, warn};

use crate::error::PlatformError;
use crate::traits::*;

fn role_selector(role: DeviceRole) -> AudioObjectPropertySelector {
    match role {
        DeviceRole::Output => kAudioHardwarePropertyDefaultOutputDevice,
        DeviceRole::SystemOutput => kAudioHardwarePropertyDefaultSystemOutputDevice,
        DeviceRole::Input => kAudioHardwarePropertyDefaultInputDevice,
    }
}

fn event_selector(kind: HardwareEventKind) -> AudioObjectPropertySelector {
    match kind {
        HardwareEventKind::DeviceListChanged => kAudioHardwarePropertyDevices,
        HardwareEventKind::DefaultInputChanged => kAudioHardwarePropertyDefaultInputDevice,
        HardwareEventKind::DefaultOutputChanged => kAudioHardwarePropertyDefaultOutputDevice,
    }
}

/// Heap-pinned state handed to the HAL as listener client data
struct ListenerContext {
    kind: HardwareEventKind,
    callback: ListenerCallback,
}

struct Registration {
    address: AudioObjectPropertyAddress,
    context: *mut ListenerContext,
}

// The context pointer is only dereferenced by the HAL listener thread while
// registered, and freed only after AudioObjectRemovePropertyListener returns.
// ListenerCallback itself is Send + Sync.
unsafe impl Send for Registration {}

unsafe extern "C" fn hardware_listener(
    _object_id: AudioObjectID,
    _address_count: u32,
    _addresses: *const AudioObjectPropertyAddress,
    client_data: *mut c_void,
) -> OSStatus {
    if client_data.is_null() {
        return 0;
    }
    let context = &*(client_data as *const ListenerContext);
    // Never unwind across the FFI boundary
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        (context.callback)(context.kind)
    }));
    0
}

/// CoreAudio hardware backend
pub struct CoreAudioHardware {
    listeners: HashMap<SubscriptionId, Registration>,
    next_subscription: u64,
}

impl CoreAudioHardware {
    /// Create a new CoreAudio backend
    pub fn new() -> Result<Self, PlatformError> {
        info!("Initializing CoreAudio backend");

        if let Err(status) = coreaudio::detach_notification_run_loop() {
            // Notifications may then only arrive while a main run loop spins
            warn!(
                "Could not detach HAL notifications from the main run loop: OSStatus {}",
                status
            );
        }

        Ok(Self {
            listeners: HashMap::new(),
            next_subscription: 0,
        })
    }

    fn remove_registration(registration: Registration) -> Result<(), OSStatus> {
        unsafe {
            let status = AudioObjectRemovePropertyListener(
                kAudioObjectSystemObject,
                &registration.address,
                Some(hardware_listener),
                registration.context as *mut c_void,
            );
            if status != 0 {
                // Leak the context rather than free memory the HAL may still call into
                return Err(status);
            }
            drop(Box::from_raw(registration.context));
        }
        Ok(())
    }
}

impl AudioHardware for CoreAudioHardware {
    fn name(&self) -> &'static str {
        "CoreAudio"
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceId>, PlatformError> {
        coreaudio::list_device_ids().map_err(|status| PlatformError::EnumerationFailed { status })
    }

    fn device_attribute(
        &self,
        device: DeviceId,
        attribute: DeviceAttribute,
    ) -> Result<AttributeValue, PlatformError> {
        let result = match attribute {
            DeviceAttribute::Name => {
                coreaudio::get_string_property(device, kAudioObjectPropertyName)
                    .map(AttributeValue::Text)
            }
            DeviceAttribute::LegacyName => {
                coreaudio::get_string_property(device, kAudioDevicePropertyDeviceNameCFString)
                    .map(AttributeValue::Text)
            }
            DeviceAttribute::IsAlive => coreaudio::get_u32_property(
                device,
                kAudioDevicePropertyDeviceIsAlive,
                kAudioObjectPropertyScopeGlobal,
            )
            .map(|v| AttributeValue::Flag(v != 0)),
            DeviceAttribute::InputStreamCount => coreaudio::stream_count(
                device,
                kAudioDevicePropertyStreams,
                kAudioObjectPropertyScopeInput,
            )
            .map(AttributeValue::Count),
            DeviceAttribute::OutputStreamCount => coreaudio::stream_count(
                device,
                kAudioDevicePropertyStreams,
                kAudioObjectPropertyScopeOutput,
            )
            .map(AttributeValue::Count),
            DeviceAttribute::TransportType => coreaudio::get_u32_property(
                device,
                kAudioDevicePropertyTransportType,
                kAudioObjectPropertyScopeGlobal,
            )
            .map(|raw| AttributeValue::Transport(coreaudio::transport_from_raw(raw))),
        };

        result.map_err(|status| PlatformError::QueryFailed {
            device,
            attribute,
            status,
        })
    }

    fn default_device(&self, role: DeviceRole) -> Result<DeviceId, PlatformError> {
        coreaudio::get_default_device(role_selector(role))
            .map_err(|status| PlatformError::DefaultDeviceUnavailable { role, status })
    }

    fn set_default_device(
        &mut self,
        role: DeviceRole,
        device: DeviceId,
    ) -> Result<(), PlatformError> {
        coreaudio::set_default_device(role_selector(role), device).map_err(|status| {
            PlatformError::AssignmentFailed {
                role,
                device,
                status,
            }
        })
    }

    fn subscribe(
        &mut self,
        kind: HardwareEventKind,
        callback: ListenerCallback,
    ) -> Result<SubscriptionId, PlatformError> {
        let address = coreaudio::address(event_selector(kind), kAudioObjectPropertyScopeGlobal);
        let context = Box::into_raw(Box::new(ListenerContext { kind, callback }));

        let status = unsafe {
            AudioObjectAddPropertyListener(
                kAudioObjectSystemObject,
                &address,
                Some(hardware_listener),
                context as *mut c_void,
            )
        };
        if status != 0 {
            unsafe { drop(Box::from_raw(context)) };
            return Err(PlatformError::SubscriptionFailed { kind, status });
        }

        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.insert(id, Registration { address, context });
        debug!("Subscribed to {:?} ({:?})", kind, id);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), PlatformError> {
        let registration = self
            .listeners
            .remove(&id)
            .ok_or(PlatformError::SubscriptionNotFound(id.0))?;
        let kind = unsafe { (*registration.context).kind };

        Self::remove_registration(registration)
            .map_err(|status| PlatformError::SubscriptionFailed { kind, status })?;
        debug!("Unsubscribed from {:?} ({:?})", kind, id);
        Ok(())
    }
}

impl Drop for CoreAudioHardware {
    fn drop(&mut self) {
        for (id, registration) in self.listeners.drain() {
            if let Err(status) = Self::remove_registration(registration) {
                warn!("Failed to remove listener {:?}: OSStatus {}", id, status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_coreaudio_backend_creation() {
        let backend = CoreAudioHardware::new();
        assert!(backend.is_ok());
        assert_eq!(backend.unwrap().name(), "CoreAudio");
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_default_input_is_enumerated() {
        let backend = CoreAudioHardware::new().unwrap();
        let ids = backend.enumerate_devices().unwrap();
        let input = backend.default_device(DeviceRole::Input).unwrap();
        assert!(ids.contains(&input));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_subscribe_unsubscribe() {
        let mut backend = CoreAudioHardware::new().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let id = backend
            .subscribe(
                HardwareEventKind::DeviceListChanged,
                Box::new(move |_| {
                    hits_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        backend.unsubscribe(id).unwrap();
        assert!(backend.unsubscribe(id).is_err());
    }
}
