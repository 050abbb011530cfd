//! Hardware Abstraction Traits
//!
//! Defines the interface that every audio hardware backend must provide.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Opaque device identifier, stable for the device's lifetime in the current OS session
pub type DeviceId = u32;

/// System-wide default device roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceRole {
    /// Application output
    Output,
    /// System sounds and alerts
    SystemOutput,
    /// Microphone input
    Input,
}

impl DeviceRole {
    pub const ALL: [DeviceRole; 3] = [
        DeviceRole::Output,
        DeviceRole::SystemOutput,
        DeviceRole::Input,
    ];

    /// Human-readable label used in logs and last-action text
    pub fn label(&self) -> &'static str {
        match self {
            DeviceRole::Output => "Output",
            DeviceRole::SystemOutput => "System Output",
            DeviceRole::Input => "Input",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hardware change notifications the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareEventKind {
    /// A device was added or removed
    DeviceListChanged,
    /// The system default input changed
    DefaultInputChanged,
    /// The system default output changed
    DefaultOutputChanged,
}

impl HardwareEventKind {
    pub const ALL: [HardwareEventKind; 3] = [
        HardwareEventKind::DeviceListChanged,
        HardwareEventKind::DefaultInputChanged,
        HardwareEventKind::DefaultOutputChanged,
    ];
}

/// Per-device properties the catalog reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceAttribute {
    /// Modern object name property
    Name,
    /// Legacy device name property
    LegacyName,
    /// Whether the device is alive
    IsAlive,
    /// Number of input streams
    InputStreamCount,
    /// Number of output streams
    OutputStreamCount,
    /// Connection medium
    TransportType,
}

/// Hardware-reported connection medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    BuiltIn,
    Bluetooth,
    BluetoothLe,
    Usb,
    Virtual,
    Aggregate,
    /// Any other four-char transport code
    Other(u32),
}

impl TransportType {
    pub fn is_bluetooth(&self) -> bool {
        matches!(self, TransportType::Bluetooth | TransportType::BluetoothLe)
    }
}

/// Value of a device attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(String),
    Flag(bool),
    Count(u32),
    Transport(TransportType),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttributeValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u32> {
        match self {
            AttributeValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_transport(&self) -> Option<TransportType> {
        match self {
            AttributeValue::Transport(t) => Some(*t),
            _ => None,
        }
    }
}

/// Handle returned by `AudioHardware::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked when a hardware notification arrives
///
/// Backends may call this from any thread. Implementations on the engine side
/// must only forward the notification, never touch engine state directly.
pub type ListenerCallback = Box<dyn Fn(HardwareEventKind) + Send + Sync + 'static>;

/// Trait for audio hardware backends
///
/// The routing engine only reads the device list and performs single-field
/// writes to the default-device selectors. No transactional guarantee exists
/// across several `set_default_device` calls.
pub trait AudioHardware: Send {
    /// Get the name of this backend (e.g., "CoreAudio", "Mock")
    fn name(&self) -> &'static str;

    /// List the ids of all currently known devices
    fn enumerate_devices(&self) -> Result<Vec<DeviceId>, PlatformError>;

    /// Read one attribute of a device
    fn device_attribute(
        &self,
        device: DeviceId,
        attribute: DeviceAttribute,
    ) -> Result<AttributeValue, PlatformError>;

    /// Get the current system default device for a role
    fn default_device(&self, role: DeviceRole) -> Result<DeviceId, PlatformError>;

    /// Set the system default device for a role
    fn set_default_device(&mut self, role: DeviceRole, device: DeviceId)
        -> Result<(), PlatformError>;

    /// Register a callback for a hardware notification kind
    fn subscribe(
        &mut self,
        kind: HardwareEventKind,
        callback: ListenerCallback,
    ) -> Result<SubscriptionId, PlatformError>;

    /// Remove a previously registered callback
    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), PlatformError>;
}
