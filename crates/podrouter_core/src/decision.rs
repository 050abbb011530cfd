//! Routing Policy
//!
//! `decide` turns a catalog snapshot and the user's input override into a
//! `RoutingPlan`. It has no side effects; the routing service carries out the
//! plan.
//!
//! Policy, in priority order:
//! 1. No Bluetooth output: idle, nothing is reassigned.
//! 2. Output and system output go to the alphabetically first Bluetooth output.
//! 3. A live override other than the built-in mic wins the input role, once.
//! 4. Otherwise the built-in mic gets the input role and is stabilized.
//! 5. Without a built-in mic the input role is left alone.

use podrouter_platform::{DeviceId, DeviceRole};

use crate::catalog::RoutingSnapshot;
use crate::device::DeviceDescriptor;

/// What to do with the input role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPlan {
    /// The user's explicit choice, applied without stabilization
    Manual(DeviceDescriptor),

    /// The built-in microphone, stabilized afterwards
    BuiltIn(DeviceDescriptor),

    /// No built-in mic was found; the input role is not touched
    Untouched,
}

/// Desired default-device assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingPlan {
    /// No Bluetooth output is connected
    Idle,

    /// Route output roles to `output` and the input role per `input`
    Route {
        output: DeviceDescriptor,
        input: InputPlan,
    },
}

impl RoutingPlan {
    pub fn is_idle(&self) -> bool {
        matches!(self, RoutingPlan::Idle)
    }

    /// Default-device writes in the order they are applied
    pub fn assignments(&self) -> Vec<(DeviceRole, DeviceId)> {
        match self {
            RoutingPlan::Idle => Vec::new(),
            RoutingPlan::Route { output, input } => {
                let mut writes = vec![
                    (DeviceRole::Output, output.id),
                    (DeviceRole::SystemOutput, output.id),
                ];
                match input {
                    InputPlan::Manual(device) | InputPlan::BuiltIn(device) => {
                        writes.push((DeviceRole::Input, device.id))
                    }
                    InputPlan::Untouched => {}
                }
                writes
            }
        }
    }

    /// Input device the stabilizer should defend, if any
    pub fn stabilize_target(&self) -> Option<DeviceId> {
        match self {
            RoutingPlan::Route {
                input: InputPlan::BuiltIn(mic),
                ..
            } => Some(mic.id),
            _ => None,
        }
    }

    /// Output device chosen by the plan
    pub fn output(&self) -> Option<&DeviceDescriptor> {
        match self {
            RoutingPlan::Idle => None,
            RoutingPlan::Route { output, .. } => Some(output),
        }
    }

    /// Input device chosen by the plan
    pub fn input(&self) -> Option<&DeviceDescriptor> {
        match self {
            RoutingPlan::Route {
                input: InputPlan::Manual(device) | InputPlan::BuiltIn(device),
                ..
            } => Some(device),
            _ => None,
        }
    }

    /// Last-action text describing a successful application of this plan
    pub fn last_action(&self) -> String {
        match self {
            RoutingPlan::Idle => "Idle — no Bluetooth audio".to_string(),
            RoutingPlan::Route { output, input } => match input {
                InputPlan::Manual(device) => {
                    format!("✓ {} output + {} mic (manual)", output.name, device.name)
                }
                InputPlan::BuiltIn(mic) => format!("✓ {} output + {} mic", output.name, mic.name),
                InputPlan::Untouched => {
                    format!("✓ {} output (no built-in mic found)", output.name)
                }
            },
        }
    }
}

/// Compute the routing plan for `snapshot`
///
/// An override that no longer refers to a present input device is ignored,
/// which degrades to the built-in mic path.
pub fn decide(snapshot: &RoutingSnapshot, override_input: Option<DeviceId>) -> RoutingPlan {
    let output = match snapshot.bluetooth_outputs.first() {
        Some(device) => device.clone(),
        None => return RoutingPlan::Idle,
    };

    let manual = snapshot
        .live_override(override_input)
        .filter(|id| Some(*id) != snapshot.builtin_mic_id())
        .and_then(|id| snapshot.input(id).cloned());

    let input = match (manual, &snapshot.builtin_mic) {
        (Some(device), _) => InputPlan::Manual(device),
        (None, Some(mic)) => InputPlan::BuiltIn(mic.clone()),
        (None, None) => InputPlan::Untouched,
    };

    RoutingPlan::Route { output, input }
}
