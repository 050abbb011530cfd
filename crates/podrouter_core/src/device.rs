//! Device Descriptors

use serde::{Deserialize, Serialize};

use podrouter_platform::{DeviceId, TransportType};

/// Immutable description of one device, rebuilt on every catalog refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Hardware device id
    pub id: DeviceId,

    /// Display name, or `"Device <id>"` when no name could be read
    pub name: String,

    pub is_alive: bool,

    /// At least one input stream
    pub supports_input: bool,

    /// At least one output stream
    pub supports_output: bool,

    /// Bluetooth transport, or a name matching a Bluetooth accessory hint
    pub is_bluetooth: bool,

    /// Reported transport, when the query succeeded
    pub transport: Option<TransportType>,
}

impl DeviceDescriptor {
    /// Placeholder name for a device whose name cannot be read
    pub fn fallback_name(id: DeviceId) -> String {
        format!("Device {}", id)
    }

    /// Whether the name contains any of `hints`, ignoring case
    pub fn name_matches(&self, hints: &[String]) -> bool {
        name_matches(&self.name, hints)
    }
}

pub(crate) fn name_matches(name: &str, hints: &[String]) -> bool {
    let name = name.to_lowercase();
    hints
        .iter()
        .map(|hint| hint.trim())
        .filter(|hint| !hint.is_empty())
        .any(|hint| name.contains(&hint.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_name_matching_is_case_insensitive() {
        let bt = hints(&["airpods", "buds"]);
        assert!(name_matches("Ken's AirPods Pro", &bt));
        assert!(name_matches("Galaxy BUDS2", &bt));
        assert!(!name_matches("Studio Display Speakers", &bt));
    }

    #[test]
    fn test_empty_hint_never_matches() {
        assert!(!name_matches("Anything", &hints(&[""])));
    }

    #[test]
    fn test_whitespace_hint_never_matches() {
        let bt = hints(&[" ", "\t", " airpods "]);
        assert!(!name_matches("Studio Display Speakers", &bt));
        assert!(name_matches("Ken's AirPods Pro", &bt));
    }

    #[test]
    fn test_fallback_name() {
        assert_eq!(DeviceDescriptor::fallback_name(73), "Device 73");
    }
}
