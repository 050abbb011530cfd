//! Device Catalog
//!
//! Reads the live device list from the hardware and partitions it into the
//! sets the routing policy works on. A refresh never fails: a property that
//! cannot be read counts as absent, and an unreadable device list yields an
//! empty snapshot.

use serde::Serialize;
use tracing::{debug, warn};

use podrouter_platform::{AudioHardware, DeviceAttribute, DeviceId, DeviceRole};

use crate::config::EngineConfig;
use crate::device::{name_matches, DeviceDescriptor};

/// Point-in-time view of the devices relevant to routing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutingSnapshot {
    /// Every live device, in enumeration order
    pub devices: Vec<DeviceDescriptor>,

    /// Live Bluetooth devices with output, sorted by name
    pub bluetooth_outputs: Vec<DeviceDescriptor>,

    /// Live devices with input, sorted by name
    pub inputs: Vec<DeviceDescriptor>,

    /// System default input at refresh time
    pub default_input: Option<DeviceId>,

    /// First input whose name matches a built-in mic hint
    pub builtin_mic: Option<DeviceDescriptor>,
}

impl RoutingSnapshot {
    pub fn has_bluetooth_output(&self) -> bool {
        !self.bluetooth_outputs.is_empty()
    }

    pub fn builtin_mic_id(&self) -> Option<DeviceId> {
        self.builtin_mic.as_ref().map(|mic| mic.id)
    }

    /// Input device with `id`, if present
    pub fn input(&self, id: DeviceId) -> Option<&DeviceDescriptor> {
        self.inputs.iter().find(|d| d.id == id)
    }

    /// Display name for `id`, falling back to `"Device <id>"`
    pub fn name_of(&self, id: DeviceId) -> String {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| DeviceDescriptor::fallback_name(id))
    }

    /// The override, if it still refers to a present input device
    pub fn live_override(&self, override_input: Option<DeviceId>) -> Option<DeviceId> {
        override_input.filter(|id| self.input(*id).is_some())
    }
}

/// Builds `RoutingSnapshot`s from the hardware
#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    bluetooth_name_hints: Vec<String>,
    builtin_mic_hints: Vec<String>,
}

impl DeviceCatalog {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            bluetooth_name_hints: config.bluetooth_name_hints.clone(),
            builtin_mic_hints: config.builtin_mic_hints.clone(),
        }
    }

    /// Enumerate the hardware and classify every live device
    pub fn refresh(&self, hardware: &dyn AudioHardware) -> RoutingSnapshot {
        let ids = match hardware.enumerate_devices() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Device enumeration failed, treating as empty: {}", e);
                Vec::new()
            }
        };

        let devices: Vec<DeviceDescriptor> = ids
            .into_iter()
            .map(|id| self.describe(hardware, id))
            .filter(|d| d.is_alive)
            .collect();

        let default_input = match hardware.default_device(DeviceRole::Input) {
            Ok(id) => Some(id),
            Err(e) => {
                debug!("No default input: {}", e);
                None
            }
        };

        self.classify(devices, default_input)
    }

    /// Partition already-described devices into a snapshot
    ///
    /// Dead devices are dropped. Sorting is stable, so devices with equal
    /// names keep their enumeration order.
    pub fn classify(
        &self,
        devices: Vec<DeviceDescriptor>,
        default_input: Option<DeviceId>,
    ) -> RoutingSnapshot {
        let devices: Vec<DeviceDescriptor> = devices.into_iter().filter(|d| d.is_alive).collect();

        let mut bluetooth_outputs: Vec<DeviceDescriptor> = devices
            .iter()
            .filter(|d| d.supports_output && d.is_bluetooth)
            .cloned()
            .collect();
        bluetooth_outputs.sort_by(|a, b| a.name.cmp(&b.name));

        let mut inputs: Vec<DeviceDescriptor> =
            devices.iter().filter(|d| d.supports_input).cloned().collect();
        inputs.sort_by(|a, b| a.name.cmp(&b.name));

        let builtin_mic = inputs
            .iter()
            .find(|d| d.name_matches(&self.builtin_mic_hints))
            .cloned();

        debug!(
            "Catalog: {} devices, {} Bluetooth outputs, {} inputs, built-in mic {:?}",
            devices.len(),
            bluetooth_outputs.len(),
            inputs.len(),
            builtin_mic.as_ref().map(|m| &m.name)
        );

        RoutingSnapshot {
            devices,
            bluetooth_outputs,
            inputs,
            default_input,
            builtin_mic,
        }
    }

    /// Read all attributes of one device, tolerating individual failures
    pub fn describe(&self, hardware: &dyn AudioHardware, id: DeviceId) -> DeviceDescriptor {
        let name = resolve_name(hardware, id);

        let is_alive = hardware
            .device_attribute(id, DeviceAttribute::IsAlive)
            .ok()
            .and_then(|v| v.as_flag())
            .unwrap_or(false);
        let input_streams = hardware
            .device_attribute(id, DeviceAttribute::InputStreamCount)
            .ok()
            .and_then(|v| v.as_count())
            .unwrap_or(0);
        let output_streams = hardware
            .device_attribute(id, DeviceAttribute::OutputStreamCount)
            .ok()
            .and_then(|v| v.as_count())
            .unwrap_or(0);
        let transport = hardware
            .device_attribute(id, DeviceAttribute::TransportType)
            .ok()
            .and_then(|v| v.as_transport());

        let is_bluetooth = transport.map_or(false, |t| t.is_bluetooth())
            || name_matches(&name, &self.bluetooth_name_hints);

        DeviceDescriptor {
            id,
            name,
            is_alive,
            supports_input: input_streams > 0,
            supports_output: output_streams > 0,
            is_bluetooth,
            transport,
        }
    }
}

/// Name property, then legacy name property, then a placeholder
fn resolve_name(hardware: &dyn AudioHardware, id: DeviceId) -> String {
    [DeviceAttribute::Name, DeviceAttribute::LegacyName]
        .into_iter()
        .find_map(|attribute| {
            hardware
                .device_attribute(id, attribute)
                .ok()
                .and_then(|v| v.as_text().map(str::to_string))
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| DeviceDescriptor::fallback_name(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use podrouter_platform::{MockDevice, MockHardware, TransportType};

    fn catalog() -> DeviceCatalog {
        DeviceCatalog::new(&EngineConfig::default())
    }

    #[test]
    fn test_refresh_classifies_devices() {
        let mock = MockHardware::with_devices(vec![
            MockDevice::bluetooth_headset(1, "AirPods Pro"),
            MockDevice::builtin_mic(2, "MacBook Pro Microphone"),
            MockDevice::output(3, "MacBook Pro Speakers").with_transport(TransportType::BuiltIn),
        ]);
        mock.force_default(DeviceRole::Input, 1);

        let snapshot = catalog().refresh(&mock);
        assert_eq!(snapshot.devices.len(), 3);
        assert_eq!(snapshot.bluetooth_outputs.len(), 1);
        assert_eq!(snapshot.bluetooth_outputs[0].id, 1);
        // Both the headset and the built-in mic have input streams
        let input_ids: Vec<_> = snapshot.inputs.iter().map(|d| d.id).collect();
        assert_eq!(input_ids, vec![1, 2]);
        assert_eq!(snapshot.builtin_mic_id(), Some(2));
        assert_eq!(snapshot.default_input, Some(1));
    }

    #[test]
    fn test_bluetooth_by_name_hint() {
        let mock = MockHardware::with_devices(vec![
            MockDevice::output(1, "Beats Studio").without_transport(),
            MockDevice::output(2, "USB DAC"),
            MockDevice::output(3, "Speaker").with_transport(TransportType::BluetoothLe),
        ]);
        let snapshot = catalog().refresh(&mock);
        let ids: Vec<_> = snapshot.bluetooth_outputs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_configured_hints_replace_defaults() {
        let config = EngineConfig::default().with_bluetooth_name_hints(vec!["jabra".into()]);
        let mock = MockHardware::with_devices(vec![
            MockDevice::output(1, "Jabra Evolve").without_transport(),
            MockDevice::output(2, "AirPods").without_transport(),
        ]);
        let snapshot = DeviceCatalog::new(&config).refresh(&mock);
        assert_eq!(snapshot.bluetooth_outputs.len(), 1);
        assert_eq!(snapshot.bluetooth_outputs[0].name, "Jabra Evolve");
    }

    #[test]
    fn test_dead_devices_are_dropped() {
        let mock = MockHardware::with_devices(vec![
            MockDevice::bluetooth_headset(1, "AirPods").dead(),
            MockDevice::builtin_mic(2, "Built-in Microphone"),
        ]);
        let snapshot = catalog().refresh(&mock);
        assert!(!snapshot.has_bluetooth_output());
        assert_eq!(snapshot.devices.len(), 1);
    }

    #[test]
    fn test_sorted_by_name_with_stable_ties() {
        let mock = MockHardware::with_devices(vec![
            MockDevice::bluetooth_headset(5, "Sony WH-1000XM5"),
            MockDevice::bluetooth_headset(9, "AirPods"),
            MockDevice::bluetooth_headset(4, "AirPods"),
        ]);
        let snapshot = catalog().refresh(&mock);
        let ids: Vec<_> = snapshot.bluetooth_outputs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![9, 4, 5]);
    }

    #[test]
    fn test_name_fallback_chain() {
        let mock = MockHardware::with_devices(vec![
            MockDevice::input(1, "ignored").without_name().with_legacy_name("Legacy Mic"),
            MockDevice::input(2, "ignored").without_name(),
        ]);
        let snapshot = catalog().refresh(&mock);
        assert_eq!(snapshot.name_of(1), "Legacy Mic");
        assert_eq!(snapshot.name_of(2), "Device 2");
        assert_eq!(snapshot.name_of(42), "Device 42");
    }

    #[test]
    fn test_query_failures_are_tolerated() {
        let mock = MockHardware::with_devices(vec![
            MockDevice::bluetooth_headset(1, "AirPods Pro"),
            MockDevice::builtin_mic(2, "MacBook Pro Microphone"),
        ]);
        mock.fail_query(1, DeviceAttribute::OutputStreamCount);
        mock.fail_query(2, DeviceAttribute::TransportType);

        let snapshot = catalog().refresh(&mock);
        assert!(!snapshot.has_bluetooth_output());
        assert_eq!(snapshot.builtin_mic_id(), Some(2));
        assert_eq!(snapshot.devices[1].transport, None);
    }

    #[test]
    fn test_unreadable_alive_flag_drops_device() {
        let mock = MockHardware::with_devices(vec![MockDevice::builtin_mic(2, "Built-in Mic")]);
        mock.fail_query(2, DeviceAttribute::IsAlive);
        assert!(catalog().refresh(&mock).devices.is_empty());
    }

    #[test]
    fn test_enumeration_failure_yields_empty_snapshot() {
        let mock = MockHardware::with_devices(vec![MockDevice::bluetooth_headset(1, "AirPods")]);
        mock.fail_enumeration(-1);
        let snapshot = catalog().refresh(&mock);
        assert!(snapshot.devices.is_empty());
        assert!(snapshot.builtin_mic.is_none());
    }

    #[test]
    fn test_live_override() {
        let mock = MockHardware::with_devices(vec![
            MockDevice::builtin_mic(2, "MacBook Pro Microphone"),
            MockDevice::input(99, "Shure MV7"),
        ]);
        let snapshot = catalog().refresh(&mock);
        assert_eq!(snapshot.live_override(Some(99)), Some(99));
        assert_eq!(snapshot.live_override(Some(100)), None);
        assert_eq!(snapshot.live_override(None), None);
    }
}
