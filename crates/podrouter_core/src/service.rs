//! Routing Service
//!
//! Sole owner of the engine state: the latest catalog snapshot, the user's
//! input override, the monitoring and auto-apply flags, and the two timers
//! (debounce and stabilization). It is driven from a single thread; every
//! time-dependent operation takes `now` explicitly so the control loop uses
//! the real clock and tests use a simulated one.
//!
//! Effects that observers care about are queued as `Event`s and drained with
//! `take_events`.

use std::time::Instant;

use tracing::{debug, error, info};

use podrouter_platform::{AudioHardware, DeviceId, DeviceRole, HardwareEventKind, PlatformError};

use crate::catalog::{DeviceCatalog, RoutingSnapshot};
use crate::config::EngineConfig;
use crate::debounce::Debouncer;
use crate::decision::{decide, InputPlan, RoutingPlan};
use crate::error::{EngineError, EngineResult};
use crate::message::{Event, RouterState};
use crate::stabilizer::{Stabilizer, StopReason, TickOutcome};

pub struct RoutingService {
    hardware: Box<dyn AudioHardware>,
    catalog: DeviceCatalog,
    config: EngineConfig,

    snapshot: RoutingSnapshot,
    override_input: Option<DeviceId>,
    selected_input: Option<DeviceId>,

    is_monitoring: bool,
    is_enabled: bool,
    show_menu: bool,
    last_action: String,

    debouncer: Debouncer,
    stabilizer: Stabilizer,
    events: Vec<Event>,
}

impl RoutingService {
    /// Create a disarmed service with auto-apply enabled
    pub fn new(hardware: Box<dyn AudioHardware>, config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;
        info!("Routing service using {} backend", hardware.name());

        Ok(Self {
            catalog: DeviceCatalog::new(&config),
            debouncer: Debouncer::new(config.debounce_interval),
            stabilizer: Stabilizer::new(),
            hardware,
            config,
            snapshot: RoutingSnapshot::default(),
            override_input: None,
            selected_input: None,
            is_monitoring: false,
            is_enabled: true,
            show_menu: false,
            last_action: "Ready".to_string(),
            events: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Arm the engine and refresh the catalog; no-op when already armed
    pub fn start_monitoring(&mut self) {
        if self.is_monitoring {
            return;
        }
        self.is_monitoring = true;
        self.last_action = "Monitoring started".to_string();
        self.refresh();
        self.update_menu_visibility();
        info!("Monitoring started");
    }

    /// Disarm the engine, cancelling pending routing and stabilization
    ///
    /// Timers are cancelled even when already disarmed, so a routing pass
    /// requested while disarmed never fires after a stop.
    pub fn stop_monitoring(&mut self) {
        if self.debouncer.cancel() {
            debug!("Cancelled pending routing application");
        }
        self.cancel_stabilization(StopReason::Disarmed);
        if !self.is_monitoring {
            return;
        }
        self.is_monitoring = false;
        self.last_action = "Monitoring stopped".to_string();
        info!("Monitoring stopped");
    }

    /// Schedule a routing application after the debounce interval
    pub fn apply_routing_rule(&mut self, now: Instant) {
        self.debouncer.request(now);
        debug!("Routing scheduled in {:?}", self.debouncer.interval());
    }

    /// Apply the user's input choice immediately and remember it as the override
    pub fn user_selected_input(&mut self, id: DeviceId, now: Instant) {
        self.override_input = Some(id);
        let failure = self.assign(DeviceRole::Input, id).err();
        if failure.is_none() {
            self.selected_input = Some(id);
        }

        if self.snapshot.builtin_mic_id() == Some(id) {
            self.stabilizer.start(
                id,
                self.config.reselect_stabilize_duration,
                self.config.stabilize_step,
                now,
            );
            if let Some(text) = failure {
                self.last_action = text;
            }
        } else {
            self.cancel_stabilization(StopReason::Cancelled);
            self.last_action = failure.unwrap_or_else(|| {
                format!("Input → {} (manual)", self.snapshot.name_of(id))
            });
        }
    }

    /// Update the auto-apply flag; enabling also schedules routing
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        self.is_enabled = enabled;
        info!("Auto-apply {}", if enabled { "enabled" } else { "disabled" });
        if enabled {
            self.apply_routing_rule(now);
        }
    }

    /// React to a hardware notification
    pub fn handle_hardware_event(&mut self, kind: HardwareEventKind, now: Instant) {
        debug!("Hardware event: {:?}", kind);
        match kind {
            HardwareEventKind::DeviceListChanged => {
                if !self.is_monitoring {
                    debug!("Ignoring device list change while disarmed");
                    return;
                }
                self.refresh();
                self.update_menu_visibility();
                if !self.is_enabled {
                    return;
                }
                if self.snapshot.has_bluetooth_output() {
                    self.apply_routing_rule(now);
                } else {
                    self.last_action = RoutingPlan::Idle.last_action();
                }
            }
            HardwareEventKind::DefaultInputChanged => {
                self.selected_input = self.hardware.default_device(DeviceRole::Input).ok();
            }
            HardwareEventKind::DefaultOutputChanged => {
                self.refresh();
            }
        }
    }

    /// Earliest instant at which `poll_timers` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debouncer.deadline(), self.stabilizer.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run whichever timers are due at `now`
    pub fn poll_timers(&mut self, now: Instant) {
        if self.debouncer.fire_if_due(now) {
            self.perform_routing(now);
        }

        let live_override = self.snapshot.live_override(self.override_input);
        match self
            .stabilizer
            .tick(now, self.is_monitoring, live_override, self.hardware.as_mut())
        {
            TickOutcome::Reasserted { to, .. } => {
                self.selected_input = Some(to);
                self.events.push(Event::InputReasserted { device: to });
            }
            TickOutcome::ReassertFailed { target, error } => {
                let text = failure_text(DeviceRole::Input, &self.snapshot.name_of(target), &error);
                self.events.push(Event::error(&error));
                self.last_action = text;
            }
            TickOutcome::Stopped(reason) => {
                self.events.push(Event::StabilizationEnded { reason });
            }
            TickOutcome::Inactive | TickOutcome::NotDue | TickOutcome::Held => {}
        }
    }

    /// Refresh, decide and apply right now, bypassing the debouncer
    ///
    /// Returns the plan that was applied.
    pub fn perform_routing(&mut self, now: Instant) -> RoutingPlan {
        self.refresh();

        let live_override = self.snapshot.live_override(self.override_input);
        let plan = decide(&self.snapshot, live_override);

        if let RoutingPlan::Route { output, input } = &plan {
            let mut failure = None;
            for (role, id) in plan.assignments() {
                if let Err(text) = self.assign(role, id) {
                    failure.get_or_insert(text);
                }
            }

            match input {
                InputPlan::BuiltIn(mic) => self.stabilizer.start(
                    mic.id,
                    self.config.stabilize_duration,
                    self.config.stabilize_step,
                    now,
                ),
                InputPlan::Manual(_) => self.cancel_stabilization(StopReason::Cancelled),
                InputPlan::Untouched => {}
            }

            if let Ok(current) = self.hardware.default_device(DeviceRole::Input) {
                self.selected_input = Some(current);
            }
            self.events.push(Event::RoutingApplied {
                output: output.id,
                input: plan.input().map(|d| d.id),
            });
            self.last_action = failure.unwrap_or_else(|| plan.last_action());
        } else {
            self.last_action = plan.last_action();
        }

        info!("{}", self.last_action);
        self.update_menu_visibility();
        plan
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Observable state snapshot
    pub fn state(&self) -> RouterState {
        RouterState {
            bluetooth_outputs: self.snapshot.bluetooth_outputs.clone(),
            inputs: self.snapshot.inputs.clone(),
            selected_input_id: self.selected_input,
            builtin_mic: self.snapshot.builtin_mic.clone(),
            is_monitoring: self.is_monitoring,
            is_stabilizing: self.stabilizer.is_active(),
            last_action: self.last_action.clone(),
            show_menu: self.show_menu,
            is_enabled: self.is_enabled,
        }
    }

    /// Drain queued events
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> &RoutingSnapshot {
        &self.snapshot
    }

    pub fn override_input(&self) -> Option<DeviceId> {
        self.override_input
    }

    pub fn is_monitoring(&self) -> bool {
        self.is_monitoring
    }

    pub fn is_stabilizing(&self) -> bool {
        self.stabilizer.is_active()
    }

    pub fn is_routing_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn last_action(&self) -> &str {
        &self.last_action
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Backend access for listener registration
    pub fn hardware_mut(&mut self) -> &mut dyn AudioHardware {
        self.hardware.as_mut()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn refresh(&mut self) {
        self.snapshot = self.catalog.refresh(self.hardware.as_ref());
        self.selected_input = self.snapshot.default_input;
    }

    fn update_menu_visibility(&mut self) {
        self.show_menu = self.snapshot.has_bluetooth_output();
    }

    fn cancel_stabilization(&mut self, reason: StopReason) {
        if self.stabilizer.cancel() {
            self.events.push(Event::StabilizationEnded { reason });
        }
    }

    /// Write one default device, returning the last-action text on failure
    fn assign(&mut self, role: DeviceRole, id: DeviceId) -> Result<(), String> {
        let name = self.snapshot.name_of(id);
        match self.hardware.set_default_device(role, id) {
            Ok(()) => {
                info!("{} → {}", role, name);
                Ok(())
            }
            Err(e) => {
                error!("Failed to set default {} device to {}: {}", role, name, e);
                let text = failure_text(role, &name, &e);
                self.events.push(Event::error(&e));
                Err(text)
            }
        }
    }
}

fn failure_text(role: DeviceRole, name: &str, error: &PlatformError) -> String {
    match error.status() {
        Some(status) => format!("✗ Failed to set {} → {} (OSStatus {})", role, name, status),
        None => format!("✗ Failed to set {} → {} ({})", role, name, error),
    }
}
