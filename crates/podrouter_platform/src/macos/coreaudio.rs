//! CoreAudio HAL property access
//!
//! Thin safe wrappers around `AudioObjectGetPropertyData` and friends. Every
//! function returns the raw `OSStatus` on failure; `CoreAudioHardware` attaches
//! the device/role context when converting to `PlatformError`.
//!
//! # Safety
//!
//! These functions use unsafe FFI calls but wrap them in safe Rust interfaces.

use std::ffi::c_void;
use std::mem;
use std::ptr;

// Rust pattern: coreaudio-sys provides raw bindings to CoreAudio C APIs
// We wrap these in safe Rust functions that handle memory management
use coreaudio_sys::{
    kAudioDeviceTransportTypeAggregate, kAudioDeviceTransportTypeBluetooth,
    kAudioDeviceTransportTypeBluetoothLE, kAudioDeviceTransportTypeBuiltIn,
    kAudioDeviceTransportTypeUSB, kAudioDeviceTransportTypeVirtual,
    kAudioHardwarePropertyDevices, kAudioHardwarePropertyRunLoop,
    kAudioObjectPropertyElementMain, kAudioObjectPropertyScopeGlobal, kAudioObjectSystemObject,
    AudioDeviceID, AudioObjectGetPropertyData, AudioObjectGetPropertyDataSize, AudioObjectID,
    AudioObjectPropertyAddress, AudioObjectPropertyScope, AudioObjectPropertySelector,
    AudioObjectSetPropertyData, AudioStreamID, OSStatus,
};

// Rust pattern: Use the core-foundation crate for safe CFString handling
use core_foundation::base::TCFType;
use core_foundation::string::CFString;

use tracing::trace;

use crate::traits::TransportType;

/// `noErr`
const NO_ERR: OSStatus = 0;

/// Build a property address on the main element
pub fn address(
    selector: AudioObjectPropertySelector,
    scope: AudioObjectPropertyScope,
) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: kAudioObjectPropertyElementMain,
    }
}

/// List all audio device ids known to the HAL
pub fn list_device_ids() -> Result<Vec<AudioDeviceID>, OSStatus> {
    let property_address = address(kAudioHardwarePropertyDevices, kAudioObjectPropertyScopeGlobal);

    unsafe {
        let mut size: u32 = 0;
        let status = AudioObjectGetPropertyDataSize(
            kAudioObjectSystemObject,
            &property_address,
            0,
            ptr::null(),
            &mut size,
        );
        if status != NO_ERR {
            return Err(status);
        }

        let device_count = size as usize / mem::size_of::<AudioDeviceID>();
        if device_count == 0 {
            return Ok(Vec::new());
        }

        let mut device_ids: Vec<AudioDeviceID> = vec![0; device_count];
        let status = AudioObjectGetPropertyData(
            kAudioObjectSystemObject,
            &property_address,
            0,
            ptr::null(),
            &mut size,
            device_ids.as_mut_ptr() as *mut c_void,
        );
        if status != NO_ERR {
            return Err(status);
        }

        // The list may shrink between the two calls
        device_ids.truncate(size as usize / mem::size_of::<AudioDeviceID>());
        trace!("Found {} audio devices", device_ids.len());
        Ok(device_ids)
    }
}

/// Read a CFString property and convert it to a Rust String
pub fn get_string_property(
    object_id: AudioObjectID,
    selector: AudioObjectPropertySelector,
) -> Result<String, OSStatus> {
    let property_address = address(selector, kAudioObjectPropertyScopeGlobal);

    unsafe {
        let mut name_cf: *const c_void = ptr::null();
        let mut size = mem::size_of::<*const c_void>() as u32;

        let status = AudioObjectGetPropertyData(
            object_id,
            &property_address,
            0,
            ptr::null(),
            &mut size,
            &mut name_cf as *mut *const c_void as *mut c_void,
        );
        if status != NO_ERR {
            return Err(status);
        }
        if name_cf.is_null() {
            return Err(NO_ERR);
        }

        // Name properties follow the create rule: we own the returned reference
        let cf_string = CFString::wrap_under_create_rule(name_cf as _);
        Ok(cf_string.to_string())
    }
}

/// Read a UInt32 property
pub fn get_u32_property(
    object_id: AudioObjectID,
    selector: AudioObjectPropertySelector,
    scope: AudioObjectPropertyScope,
) -> Result<u32, OSStatus> {
    let property_address = address(selector, scope);

    unsafe {
        let mut value: u32 = 0;
        let mut size = mem::size_of::<u32>() as u32;

        let status = AudioObjectGetPropertyData(
            object_id,
            &property_address,
            0,
            ptr::null(),
            &mut size,
            &mut value as *mut u32 as *mut c_void,
        );
        if status != NO_ERR {
            return Err(status);
        }
        Ok(value)
    }
}

/// Count the streams of a device in one direction
pub fn stream_count(
    device_id: AudioDeviceID,
    selector: AudioObjectPropertySelector,
    scope: AudioObjectPropertyScope,
) -> Result<u32, OSStatus> {
    let property_address = address(selector, scope);

    unsafe {
        let mut size: u32 = 0;
        let status = AudioObjectGetPropertyDataSize(
            device_id,
            &property_address,
            0,
            ptr::null(),
            &mut size,
        );
        if status != NO_ERR {
            return Err(status);
        }
        Ok(size / mem::size_of::<AudioStreamID>() as u32)
    }
}

/// Read one of the system default-device selectors
pub fn get_default_device(selector: AudioObjectPropertySelector) -> Result<AudioDeviceID, OSStatus> {
    get_u32_property(kAudioObjectSystemObject, selector, kAudioObjectPropertyScopeGlobal)
}

/// Write one of the system default-device selectors
pub fn set_default_device(
    selector: AudioObjectPropertySelector,
    device_id: AudioDeviceID,
) -> Result<(), OSStatus> {
    let property_address = address(selector, kAudioObjectPropertyScopeGlobal);

    unsafe {
        let size = mem::size_of::<AudioDeviceID>() as u32;
        let status = AudioObjectSetPropertyData(
            kAudioObjectSystemObject,
            &property_address,
            0,
            ptr::null(),
            size,
            &device_id as *const AudioDeviceID as *const c_void,
        );
        if status != NO_ERR {
            return Err(status);
        }
        Ok(())
    }
}

/// Let the HAL deliver property notifications on its own thread
///
/// By default notifications are tied to the main run loop, which a headless
/// daemon never spins.
pub fn detach_notification_run_loop() -> Result<(), OSStatus> {
    let property_address =
        address(kAudioHardwarePropertyRunLoop, kAudioObjectPropertyScopeGlobal);

    unsafe {
        let run_loop: *const c_void = ptr::null();
        let status = AudioObjectSetPropertyData(
            kAudioObjectSystemObject,
            &property_address,
            0,
            ptr::null(),
            mem::size_of::<*const c_void>() as u32,
            &run_loop as *const *const c_void as *const c_void,
        );
        if status != NO_ERR {
            return Err(status);
        }
        Ok(())
    }
}

/// Map a raw `kAudioDevicePropertyTransportType` value
pub fn transport_from_raw(raw: u32) -> TransportType {
    if raw == kAudioDeviceTransportTypeBluetooth {
        TransportType::Bluetooth
    } else if raw == kAudioDeviceTransportTypeBluetoothLE {
        TransportType::BluetoothLe
    } else if raw == kAudioDeviceTransportTypeBuiltIn {
        TransportType::BuiltIn
    } else if raw == kAudioDeviceTransportTypeUSB {
        TransportType::Usb
    } else if raw == kAudioDeviceTransportTypeVirtual {
        TransportType::Virtual
    } else if raw == kAudioDeviceTransportTypeAggregate {
        TransportType::Aggregate
    } else {
        TransportType::Other(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mapping() {
        assert_eq!(
            transport_from_raw(kAudioDeviceTransportTypeBluetooth),
            TransportType::Bluetooth
        );
        assert_eq!(
            transport_from_raw(kAudioDeviceTransportTypeBuiltIn),
            TransportType::BuiltIn
        );
        assert_eq!(transport_from_raw(0), TransportType::Other(0));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_list_device_ids() {
        let ids = list_device_ids().unwrap();
        for id in &ids {
            let name = get_string_property(*id, coreaudio_sys::kAudioObjectPropertyName);
            println!("  - {:?} (ID: {})", name, id);
        }
    }
}
