//! Engine Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name fragments that mark a device as a Bluetooth accessory even when its
/// transport type does not say so
pub const DEFAULT_BLUETOOTH_NAME_HINTS: &[&str] =
    &["airpods", "beats", "buds", "headset", "earbuds", "headphones"];

/// Name fragments that identify the built-in microphone
pub const DEFAULT_BUILTIN_MIC_HINTS: &[&str] = &["built-in", "internal", "macbook"];

/// Routing engine configuration
///
/// Durations are stored in the JSON form as whole milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quiet period before a requested routing application runs
    #[serde(with = "millis")]
    pub debounce_interval: Duration,

    /// Stabilization window after automatic routing to the built-in mic
    #[serde(with = "millis")]
    pub stabilize_duration: Duration,

    /// Stabilization window after the user re-selects the built-in mic
    #[serde(with = "millis")]
    pub reselect_stabilize_duration: Duration,

    /// Interval between stabilization checks
    #[serde(with = "millis")]
    pub stabilize_step: Duration,

    /// Case-insensitive substrings that mark a device name as Bluetooth
    pub bluetooth_name_hints: Vec<String>,

    /// Case-insensitive substrings that mark an input as the built-in mic
    pub builtin_mic_hints: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_interval: Duration::from_millis(350),
            stabilize_duration: Duration::from_secs(4),
            reselect_stabilize_duration: Duration::from_secs(3),
            stabilize_step: Duration::from_millis(250),
            bluetooth_name_hints: to_owned(DEFAULT_BLUETOOTH_NAME_HINTS),
            builtin_mic_hints: to_owned(DEFAULT_BUILTIN_MIC_HINTS),
        }
    }
}

impl EngineConfig {
    /// Replace the Bluetooth name hints
    pub fn with_bluetooth_name_hints(mut self, hints: Vec<String>) -> Self {
        self.bluetooth_name_hints = hints;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.debounce_interval.is_zero() {
            return Err("debounce_interval must be non-zero".into());
        }
        if self.stabilize_step.is_zero() {
            return Err("stabilize_step must be non-zero".into());
        }
        if self.stabilize_step > self.stabilize_duration
            || self.stabilize_step > self.reselect_stabilize_duration
        {
            return Err(format!(
                "stabilize_step ({:?}) exceeds a stabilization window",
                self.stabilize_step
            ));
        }
        if self.bluetooth_name_hints.iter().all(|h| h.trim().is_empty()) {
            return Err("bluetooth_name_hints must not be empty".into());
        }
        if self.builtin_mic_hints.iter().all(|h| h.trim().is_empty()) {
            return Err("builtin_mic_hints must not be empty".into());
        }
        Ok(())
    }
}

fn to_owned(hints: &[&str]) -> Vec<String> {
    hints.iter().map(|h| h.to_string()).collect()
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.debounce_interval, Duration::from_millis(350));
        assert_eq!(config.stabilize_duration, Duration::from_secs(4));
        assert_eq!(config.reselect_stabilize_duration, Duration::from_secs(3));
        assert_eq!(config.stabilize_step, Duration::from_millis(250));
        assert_eq!(config.bluetooth_name_hints.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = EngineConfig::default();
        config.debounce_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.stabilize_step = Duration::from_secs(5);
        assert!(config.validate().unwrap_err().contains("stabilize_step"));

        let config = EngineConfig::default().with_bluetooth_name_hints(Vec::new());
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.builtin_mic_hints = vec!["  ".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let json = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(json["debounce_interval"], 350);
        assert_eq!(json["stabilize_duration"], 4000);

        let back: EngineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, EngineConfig::default());
    }
}
