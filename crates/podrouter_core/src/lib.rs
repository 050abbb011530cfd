//! podrouter Core - Routing Engine
//!
//! This crate provides the routing engine for podrouter, including:
//! - Device discovery and Bluetooth / built-in microphone classification
//! - The pure routing policy (`decide`)
//! - Debounced application of routing after bursts of hardware notifications
//! - A bounded stabilization loop that defends the chosen input device
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Caller (daemon / UI)                      │
//! │      RouterEngine ──Command──▶      ◀──Event── subscribe()   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Control Thread                             │
//! │  HAL listener ──Command::Hardware──▶ RoutingService          │
//! │                                        │                     │
//! │     DeviceCatalog ──▶ decide() ──▶ default-device writes     │
//! │                         ▲                  │                 │
//! │                    Debouncer          Stabilizer (input)     │
//! │          (timers are deadlines polled by the loop)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod catalog;
mod config;
mod debounce;
mod decision;
mod device;
mod engine;
mod error;
mod message;
mod notifier;
mod service;
mod settings;
mod stabilizer;

pub use catalog::{DeviceCatalog, RoutingSnapshot};
pub use config::{EngineConfig, DEFAULT_BLUETOOTH_NAME_HINTS, DEFAULT_BUILTIN_MIC_HINTS};
pub use debounce::Debouncer;
pub use decision::{decide, InputPlan, RoutingPlan};
pub use device::DeviceDescriptor;
pub use engine::{EngineHandle, RouterEngine};
pub use error::{EngineError, EngineResult, SettingsError};
pub use message::{Command, Event, RouterState};
pub use notifier::HardwareNotifier;
pub use service::RoutingService;
pub use settings::RouterSettings;
pub use stabilizer::{Activation, Stabilizer, StopReason, TickOutcome};

// Re-export platform types for convenience
pub use podrouter_platform::{AudioHardware, DeviceId, DeviceRole, HardwareEventKind};
