//! Input Stabilization
//!
//! After the input role is assigned, the OS sometimes switches it back to the
//! Bluetooth headset's own microphone a moment later. The stabilizer keeps
//! checking the default input for a bounded window and puts the target back
//! whenever it has been replaced.
//!
//! ```text
//!            start()                      tick(): reassert if reverted
//!   Idle ─────────────▶ Stabilizing ◀──────────────┐
//!    ▲                      │  └───────────────────┘
//!    └──────────────────────┘
//!     disarmed | deadline passed | override changed | cancel()
//! ```
//!
//! Only one activation exists at a time; starting a new one replaces it.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use podrouter_platform::{AudioHardware, DeviceId, DeviceRole, PlatformError};

/// Why a stabilization window ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Monitoring was stopped
    Disarmed,
    /// The window elapsed
    DeadlineElapsed,
    /// The user's override now targets another device
    OverrideChanged,
    /// Replaced or cancelled by the routing service
    Cancelled,
}

/// One in-flight stabilization window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub target: DeviceId,
    pub deadline: Instant,
    pub step: Duration,
    pub next_tick: Instant,
}

/// Result of polling the stabilizer
#[derive(Debug)]
pub enum TickOutcome {
    /// No activation in flight
    Inactive,
    /// Activation in flight, next check not reached yet
    NotDue,
    /// Default input already matches the target (or could not be read)
    Held,
    /// Default input had been reverted and was set back to the target
    Reasserted { from: DeviceId, to: DeviceId },
    /// Setting the target back failed; the window keeps running
    ReassertFailed {
        target: DeviceId,
        error: PlatformError,
    },
    /// The activation ended
    Stopped(StopReason),
}

#[derive(Debug, Default)]
pub struct Stabilizer {
    activation: Option<Activation>,
}

impl Stabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin defending `target` for `duration`, replacing any prior activation
    pub fn start(&mut self, target: DeviceId, duration: Duration, step: Duration, now: Instant) {
        if let Some(prior) = &self.activation {
            debug!("Replacing stabilization of device {}", prior.target);
        }
        self.activation = Some(Activation {
            target,
            deadline: now + duration,
            step,
            next_tick: now + step,
        });
        debug!(
            "Stabilizing input on device {} for {:?} every {:?}",
            target, duration, step
        );
    }

    /// End the activation, returning whether one was in flight
    pub fn cancel(&mut self) -> bool {
        self.activation.take().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.activation.is_some()
    }

    pub fn activation(&self) -> Option<&Activation> {
        self.activation.as_ref()
    }

    pub fn target(&self) -> Option<DeviceId> {
        self.activation.as_ref().map(|a| a.target)
    }

    /// When the control loop should next call `tick`
    pub fn next_deadline(&self) -> Option<Instant> {
        self.activation.as_ref().map(|a| a.next_tick)
    }

    /// Run one step check if it is due
    ///
    /// `live_override` is the user's input override, counted only while that
    /// device is present.
    pub fn tick(
        &mut self,
        now: Instant,
        monitoring: bool,
        live_override: Option<DeviceId>,
        hardware: &mut dyn AudioHardware,
    ) -> TickOutcome {
        let activation = match &mut self.activation {
            Some(activation) => activation,
            None => return TickOutcome::Inactive,
        };
        if now < activation.next_tick {
            return TickOutcome::NotDue;
        }

        let stop = if !monitoring {
            Some(StopReason::Disarmed)
        } else if now > activation.deadline {
            Some(StopReason::DeadlineElapsed)
        } else if live_override.map_or(false, |id| id != activation.target) {
            Some(StopReason::OverrideChanged)
        } else {
            None
        };
        if let Some(reason) = stop {
            debug!("Stabilization of device {} ended: {:?}", activation.target, reason);
            self.activation = None;
            return TickOutcome::Stopped(reason);
        }

        activation.next_tick = now + activation.step;
        let target = activation.target;

        let current = match hardware.default_device(DeviceRole::Input) {
            Ok(current) => current,
            Err(e) => {
                debug!("Skipping stabilization check: {}", e);
                return TickOutcome::Held;
            }
        };
        if current == target {
            return TickOutcome::Held;
        }

        match hardware.set_default_device(DeviceRole::Input, target) {
            Ok(()) => {
                info!("Reasserted input device {} (was {})", target, current);
                TickOutcome::Reasserted {
                    from: current,
                    to: target,
                }
            }
            Err(e) => {
                warn!("Failed to reassert input device {}: {}", target, e);
                TickOutcome::ReassertFailed { target, error: e }
            }
        }
    }
}
