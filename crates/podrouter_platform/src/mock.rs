//! Mock hardware backend for testing.
//!
//! Provides an in-memory device table that behaves like the system audio
//! hardware without requiring real devices or permissions. Tests keep a clone
//! of the handle to change the device list, simulate the OS reverting a
//! default device, inject failures, and fire notifications.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::PlatformError;
use crate::traits::{
    AttributeValue, AudioHardware, DeviceAttribute, DeviceId, DeviceRole, HardwareEventKind,
    ListenerCallback, SubscriptionId, TransportType,
};

/// `kAudioHardwareBadDeviceError` ('!dev')
pub const BAD_DEVICE_STATUS: i32 = 0x2164_6576;

/// `kAudioHardwareUnspecifiedError` ('what')
pub const UNSPECIFIED_STATUS: i32 = 0x7768_6174;

/// A fake audio device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub id: DeviceId,
    pub name: Option<String>,
    pub legacy_name: Option<String>,
    pub alive: bool,
    pub input_streams: u32,
    pub output_streams: u32,
    pub transport: Option<TransportType>,
}

impl MockDevice {
    /// An output-only device with one stream
    pub fn output(id: DeviceId, name: &str) -> Self {
        Self {
            id,
            name: Some(name.to_string()),
            legacy_name: None,
            alive: true,
            input_streams: 0,
            output_streams: 1,
            transport: Some(TransportType::Usb),
        }
    }

    /// An input-only device with one stream
    pub fn input(id: DeviceId, name: &str) -> Self {
        Self {
            input_streams: 1,
            output_streams: 0,
            ..Self::output(id, name)
        }
    }

    /// Built-in microphone with the built-in transport
    pub fn builtin_mic(id: DeviceId, name: &str) -> Self {
        Self::input(id, name).with_transport(TransportType::BuiltIn)
    }

    /// Bluetooth headset exposing both output and a (low quality) input
    pub fn bluetooth_headset(id: DeviceId, name: &str) -> Self {
        Self {
            input_streams: 1,
            ..Self::output(id, name).with_transport(TransportType::Bluetooth)
        }
    }

    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn without_transport(mut self) -> Self {
        self.transport = None;
        self
    }

    pub fn with_legacy_name(mut self, name: &str) -> Self {
        self.legacy_name = Some(name.to_string());
        self
    }

    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn dead(mut self) -> Self {
        self.alive = false;
        self
    }
}

struct Listener {
    id: SubscriptionId,
    kind: HardwareEventKind,
    callback: Arc<dyn Fn(HardwareEventKind) + Send + Sync>,
}

#[derive(Default)]
struct MockState {
    devices: Vec<MockDevice>,
    defaults: HashMap<DeviceRole, DeviceId>,
    writes: Vec<(DeviceRole, DeviceId)>,
    failing_writes: HashMap<DeviceRole, i32>,
    failing_queries: HashSet<(DeviceId, DeviceAttribute)>,
    enumeration_failure: Option<i32>,
    input_snap_back: Option<(DeviceId, u32)>,
    listeners: Vec<Listener>,
    next_subscription: u64,
}

/// In-memory `AudioHardware` implementation
///
/// Cloning yields another handle to the same device table.
#[derive(Clone, Default)]
pub struct MockHardware {
    state: Arc<Mutex<MockState>>,
}

impl MockHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock backend pre-populated with devices
    pub fn with_devices(devices: Vec<MockDevice>) -> Self {
        let mock = Self::new();
        mock.state.lock().devices = devices;
        mock
    }

    /// Add a device without firing a notification
    pub fn add_device(&self, device: MockDevice) {
        self.state.lock().devices.push(device);
    }

    /// Remove a device without firing a notification
    pub fn remove_device(&self, id: DeviceId) {
        self.state.lock().devices.retain(|d| d.id != id);
    }

    /// Add a device and fire `DeviceListChanged`
    pub fn connect(&self, device: MockDevice) {
        self.add_device(device);
        self.fire(HardwareEventKind::DeviceListChanged);
    }

    /// Remove a device and fire `DeviceListChanged`
    pub fn disconnect(&self, id: DeviceId) {
        self.remove_device(id);
        self.fire(HardwareEventKind::DeviceListChanged);
    }

    /// Simulate the OS changing a default device on its own
    ///
    /// Not recorded in `writes()`. Fires the matching notification.
    pub fn force_default(&self, role: DeviceRole, id: DeviceId) {
        self.state.lock().defaults.insert(role, id);
        if let Some(kind) = notification_for(role) {
            self.fire(kind);
        }
    }

    /// Current default for a role, bypassing failure injection
    pub fn current_default(&self, role: DeviceRole) -> Option<DeviceId> {
        self.state.lock().defaults.get(&role).copied()
    }

    /// Every successful default-device write, in order
    pub fn writes(&self) -> Vec<(DeviceRole, DeviceId)> {
        self.state.lock().writes.clone()
    }

    /// Successful writes for a single role, in order
    pub fn writes_for(&self, role: DeviceRole) -> Vec<DeviceId> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Make writes to `role` fail with `status`
    pub fn fail_writes(&self, role: DeviceRole, status: i32) {
        self.state.lock().failing_writes.insert(role, status);
    }

    /// Make one attribute query fail for a device
    pub fn fail_query(&self, id: DeviceId, attribute: DeviceAttribute) {
        self.state.lock().failing_queries.insert((id, attribute));
    }

    /// Make device enumeration fail with `status`
    pub fn fail_enumeration(&self, status: i32) {
        self.state.lock().enumeration_failure = Some(status);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_writes.clear();
        state.failing_queries.clear();
        state.enumeration_failure = None;
    }

    /// After each of the next `times` input writes, the "OS" snaps the
    /// default input back to `to`
    pub fn snap_back_input(&self, to: DeviceId, times: u32) {
        self.state.lock().input_snap_back = Some((to, times));
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Deliver a notification to every subscriber of `kind`
    ///
    /// Callbacks run on the calling thread, outside the internal lock.
    pub fn fire(&self, kind: HardwareEventKind) {
        let callbacks: Vec<_> = self
            .state
            .lock()
            .listeners
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| Arc::clone(&l.callback))
            .collect();

        trace!("Mock firing {:?} to {} listeners", kind, callbacks.len());
        for callback in callbacks {
            callback(kind);
        }
    }
}

fn notification_for(role: DeviceRole) -> Option<HardwareEventKind> {
    match role {
        DeviceRole::Input => Some(HardwareEventKind::DefaultInputChanged),
        DeviceRole::Output => Some(HardwareEventKind::DefaultOutputChanged),
        DeviceRole::SystemOutput => None,
    }
}

impl AudioHardware for MockHardware {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceId>, PlatformError> {
        let state = self.state.lock();
        if let Some(status) = state.enumeration_failure {
            return Err(PlatformError::EnumerationFailed { status });
        }
        Ok(state.devices.iter().map(|d| d.id).collect())
    }

    fn device_attribute(
        &self,
        device: DeviceId,
        attribute: DeviceAttribute,
    ) -> Result<AttributeValue, PlatformError> {
        let state = self.state.lock();
        let failed = PlatformError::QueryFailed {
            device,
            attribute,
            status: UNSPECIFIED_STATUS,
        };

        if state.failing_queries.contains(&(device, attribute)) {
            return Err(failed);
        }

        let dev = state
            .devices
            .iter()
            .find(|d| d.id == device)
            .ok_or(PlatformError::DeviceNotFound(device))?;

        match attribute {
            DeviceAttribute::Name => dev.name.clone().map(AttributeValue::Text).ok_or(failed),
            DeviceAttribute::LegacyName => dev
                .legacy_name
                .clone()
                .map(AttributeValue::Text)
                .ok_or(failed),
            DeviceAttribute::IsAlive => Ok(AttributeValue::Flag(dev.alive)),
            DeviceAttribute::InputStreamCount => Ok(AttributeValue::Count(dev.input_streams)),
            DeviceAttribute::OutputStreamCount => Ok(AttributeValue::Count(dev.output_streams)),
            DeviceAttribute::TransportType => {
                dev.transport.map(AttributeValue::Transport).ok_or(failed)
            }
        }
    }

    fn default_device(&self, role: DeviceRole) -> Result<DeviceId, PlatformError> {
        self.state
            .lock()
            .defaults
            .get(&role)
            .copied()
            .ok_or(PlatformError::DefaultDeviceUnavailable {
                role,
                status: UNSPECIFIED_STATUS,
            })
    }

    fn set_default_device(
        &mut self,
        role: DeviceRole,
        device: DeviceId,
    ) -> Result<(), PlatformError> {
        let changed = {
            let mut state = self.state.lock();

            if let Some(&status) = state.failing_writes.get(&role) {
                return Err(PlatformError::AssignmentFailed {
                    role,
                    device,
                    status,
                });
            }
            if !state.devices.iter().any(|d| d.id == device) {
                return Err(PlatformError::AssignmentFailed {
                    role,
                    device,
                    status: BAD_DEVICE_STATUS,
                });
            }

            state.writes.push((role, device));
            let previous = state.defaults.insert(role, device);

            if role == DeviceRole::Input {
                if let Some((to, remaining)) = state.input_snap_back {
                    if remaining > 0 && to != device {
                        state.defaults.insert(DeviceRole::Input, to);
                        state.input_snap_back = Some((to, remaining - 1));
                    }
                }
            }

            previous != state.defaults.get(&role).copied()
        };

        if changed {
            if let Some(kind) = notification_for(role) {
                self.fire(kind);
            }
        }
        Ok(())
    }

    fn subscribe(
        &mut self,
        kind: HardwareEventKind,
        callback: ListenerCallback,
    ) -> Result<SubscriptionId, PlatformError> {
        let mut state = self.state.lock();
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        state.listeners.push(Listener {
            id,
            kind,
            callback: Arc::from(callback),
        });
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        if state.listeners.len() == before {
            return Err(PlatformError::SubscriptionNotFound(id.0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> MockHardware {
        MockHardware::with_devices(vec![
            MockDevice::bluetooth_headset(1, "AirPods Pro"),
            MockDevice::builtin_mic(2, "MacBook Pro Microphone"),
        ])
    }

    #[test]
    fn test_mock_enumeration() {
        let mock = sample();
        assert_eq!(mock.enumerate_devices().unwrap(), vec![1, 2]);
        assert_eq!(mock.name(), "Mock");

        mock.fail_enumeration(-1);
        assert!(mock.enumerate_devices().is_err());
    }

    #[test]
    fn test_mock_attributes() {
        let mock = sample();
        assert_eq!(
            mock.device_attribute(1, DeviceAttribute::TransportType).unwrap(),
            AttributeValue::Transport(TransportType::Bluetooth)
        );
        assert_eq!(
            mock.device_attribute(2, DeviceAttribute::OutputStreamCount).unwrap(),
            AttributeValue::Count(0)
        );
        // No legacy name configured
        assert!(mock.device_attribute(2, DeviceAttribute::LegacyName).is_err());

        mock.fail_query(1, DeviceAttribute::Name);
        assert!(mock.device_attribute(1, DeviceAttribute::Name).is_err());
    }

    #[test]
    fn test_mock_writes_and_failures() {
        let mut mock = sample();
        mock.set_default_device(DeviceRole::Output, 1).unwrap();
        assert_eq!(mock.default_device(DeviceRole::Output).unwrap(), 1);
        assert_eq!(mock.writes(), vec![(DeviceRole::Output, 1)]);

        let err = mock.set_default_device(DeviceRole::Input, 99).unwrap_err();
        assert_eq!(err.status(), Some(BAD_DEVICE_STATUS));

        mock.fail_writes(DeviceRole::Input, -50);
        let err = mock.set_default_device(DeviceRole::Input, 2).unwrap_err();
        assert_eq!(err.status(), Some(-50));
        assert_eq!(mock.writes().len(), 1);
    }

    #[test]
    fn test_mock_snap_back() {
        let mut mock = sample();
        mock.snap_back_input(1, 1);

        mock.set_default_device(DeviceRole::Input, 2).unwrap();
        assert_eq!(mock.current_default(DeviceRole::Input), Some(1));

        mock.set_default_device(DeviceRole::Input, 2).unwrap();
        assert_eq!(mock.current_default(DeviceRole::Input), Some(2));
    }

    #[test]
    fn test_mock_subscriptions() {
        let mut mock = sample();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let id = mock
            .subscribe(
                HardwareEventKind::DeviceListChanged,
                Box::new(move |_| {
                    hits_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        mock.connect(MockDevice::output(3, "Studio Display Speakers"));
        mock.fire(HardwareEventKind::DefaultInputChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        mock.unsubscribe(id).unwrap();
        assert_eq!(mock.listener_count(), 0);
        assert!(mock.unsubscribe(id).is_err());

        mock.disconnect(3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
