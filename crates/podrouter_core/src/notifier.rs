//! Hardware Change Notifier
//!
//! Registers one listener per `HardwareEventKind` with the backend. Listener
//! callbacks may run on any thread, so they only forward the event kind onto
//! the engine's command channel; the control thread handles it in order.

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use podrouter_platform::{AudioHardware, HardwareEventKind, PlatformError, SubscriptionId};

use crate::message::Command;

/// Live listener registrations on a backend
#[derive(Debug, Default)]
pub struct HardwareNotifier {
    subscriptions: Vec<(HardwareEventKind, SubscriptionId)>,
}

impl HardwareNotifier {
    /// Subscribe to every hardware event kind
    ///
    /// If any subscription fails, the ones already made are removed again
    /// before the error is returned.
    pub fn attach(
        hardware: &mut dyn AudioHardware,
        commands: Sender<Command>,
    ) -> Result<Self, PlatformError> {
        let mut notifier = Self::default();

        for kind in HardwareEventKind::ALL {
            let sender = commands.clone();
            let callback = Box::new(move |kind: HardwareEventKind| {
                // Receiver gone means the engine has shut down
                let _ = sender.send(Command::Hardware(kind));
            });

            match hardware.subscribe(kind, callback) {
                Ok(id) => notifier.subscriptions.push((kind, id)),
                Err(e) => {
                    notifier.detach(hardware);
                    return Err(e);
                }
            }
        }

        debug!(
            "Subscribed to {} hardware notifications on {}",
            notifier.subscriptions.len(),
            hardware.name()
        );
        Ok(notifier)
    }

    /// Remove every registration
    pub fn detach(&mut self, hardware: &mut dyn AudioHardware) {
        for (kind, id) in self.subscriptions.drain(..) {
            match hardware.unsubscribe(id) {
                Ok(()) => debug!("Unsubscribed from {:?}", kind),
                Err(e) => warn!("Failed to unsubscribe from {:?}: {}", kind, e),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use podrouter_platform::{MockDevice, MockHardware};

    #[test]
    fn test_attach_forwards_notifications() {
        let mut mock = MockHardware::new();
        let (tx, rx) = unbounded();
        let notifier = HardwareNotifier::attach(&mut mock, tx).unwrap();
        assert_eq!(notifier.len(), 3);
        assert_eq!(mock.listener_count(), 3);

        mock.connect(MockDevice::bluetooth_headset(1, "AirPods"));
        assert!(matches!(
            rx.try_recv(),
            Ok(Command::Hardware(HardwareEventKind::DeviceListChanged))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_detach_is_exhaustive() {
        let mut mock = MockHardware::new();
        let (tx, rx) = unbounded();
        let mut notifier = HardwareNotifier::attach(&mut mock, tx).unwrap();

        notifier.detach(&mut mock);
        assert!(notifier.is_empty());
        assert_eq!(mock.listener_count(), 0);

        mock.fire(HardwareEventKind::DefaultInputChanged);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_harmless() {
        let mut mock = MockHardware::new();
        let (tx, rx) = unbounded();
        let _notifier = HardwareNotifier::attach(&mut mock, tx).unwrap();
        drop(rx);
        mock.fire(HardwareEventKind::DefaultOutputChanged);
    }
}
