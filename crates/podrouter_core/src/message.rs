//! Message Types for Thread Communication
//!
//! Commands flow from callers and HAL listeners -> control thread
//! Events flow from control thread -> subscribed observers

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use podrouter_platform::{DeviceId, HardwareEventKind};

use crate::device::DeviceDescriptor;
use crate::stabilizer::StopReason;

/// Commands processed by the control thread
#[derive(Debug, Clone)]
pub enum Command {
    /// Arm the engine
    StartMonitoring,

    /// Disarm the engine, cancelling pending routing and stabilization
    StopMonitoring,

    /// Schedule a debounced routing application
    ApplyRoutingRule,

    /// The user explicitly picked an input device
    UserSelectedInput(DeviceId),

    /// Update the auto-apply flag
    SetEnabled(bool),

    /// A hardware notification, forwarded from a listener callback
    Hardware(HardwareEventKind),

    /// Register an observer channel (receives a StateUpdate immediately)
    Subscribe(Sender<Event>),

    /// Request current state (triggers StateUpdate event)
    RequestState,

    /// Shutdown the engine
    Shutdown,
}

/// Observable engine state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterState {
    /// Connected Bluetooth outputs, sorted by name
    pub bluetooth_outputs: Vec<DeviceDescriptor>,

    /// Available inputs, sorted by name
    pub inputs: Vec<DeviceDescriptor>,

    /// Current system default input
    pub selected_input_id: Option<DeviceId>,

    pub builtin_mic: Option<DeviceDescriptor>,
    pub is_monitoring: bool,
    pub is_stabilizing: bool,

    /// Human-readable description of the last action, for display only
    pub last_action: String,

    /// Whether the menu surface should be shown (any Bluetooth output present)
    pub show_menu: bool,

    /// Auto-apply routing on device changes
    pub is_enabled: bool,
}

/// Events sent from the control thread to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Current state snapshot, sent whenever it changes
    StateUpdate(RouterState),

    /// A routing plan was applied
    RoutingApplied {
        output: DeviceId,
        input: Option<DeviceId>,
    },

    /// The stabilizer set the default input back to its target
    InputReasserted { device: DeviceId },

    /// A stabilization window ended
    StabilizationEnded { reason: StopReason },

    /// Error occurred
    Error { message: String },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}
