//! Router Engine - Main Entry Point
//!
//! The RouterEngine owns the control thread and is the handle callers use to
//! drive routing.
//!
//! # Architecture
//!
//! ```text
//!   caller ─┐
//!           ├─ Command ──▶ crossbeam channel ──▶ control thread
//!   HAL  ───┘                                     │
//!                                                 ├─ RoutingService (all state)
//!                                                 ├─ debounce / stabilizer deadlines
//!                                                 └─ Event ──▶ observers
//! ```
//!
//! The command channel is unbounded: listener callbacks fire from inside
//! default-device writes made on the control thread itself, and must never
//! block there.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use podrouter_platform::{AudioHardware, DeviceId};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event, RouterState};
use crate::notifier::HardwareNotifier;
use crate::service::RoutingService;

/// Handle to the routing engine's control thread
pub struct RouterEngine {
    /// Channel for sending commands to the control thread
    command_sender: Sender<Command>,

    /// Handle to the control thread
    control_thread: Option<JoinHandle<()>>,

    /// Current configuration
    config: EngineConfig,
}

impl RouterEngine {
    /// Create a new engine with default configuration
    pub fn new(hardware: Box<dyn AudioHardware>) -> EngineResult<Self> {
        Self::with_config(hardware, EngineConfig::default())
    }

    /// Create a new engine with custom configuration
    ///
    /// Hardware listeners are registered before this returns; the engine
    /// starts disarmed.
    pub fn with_config(hardware: Box<dyn AudioHardware>, config: EngineConfig) -> EngineResult<Self> {
        let mut service = RoutingService::new(hardware, config.clone())?;

        let (command_sender, command_receiver) = unbounded::<Command>();
        let notifier = HardwareNotifier::attach(service.hardware_mut(), command_sender.clone())?;

        let control_thread = thread::Builder::new()
            .name("podrouter-control".into())
            .spawn(move || {
                Self::control_thread_main(service, notifier, command_receiver);
            })
            .map_err(|e| EngineError::ThreadSpawnError(e.to_string()))?;

        Ok(Self {
            command_sender,
            control_thread: Some(control_thread),
            config,
        })
    }

    /// Arm the engine
    pub fn start_monitoring(&self) -> EngineResult<()> {
        self.send_command(Command::StartMonitoring)
    }

    /// Disarm the engine
    pub fn stop_monitoring(&self) -> EngineResult<()> {
        self.send_command(Command::StopMonitoring)
    }

    /// Schedule a debounced routing application
    pub fn apply_routing_rule(&self) -> EngineResult<()> {
        self.send_command(Command::ApplyRoutingRule)
    }

    /// Apply an explicit input choice immediately
    pub fn user_selected_input(&self, id: DeviceId) -> EngineResult<()> {
        self.send_command(Command::UserSelectedInput(id))
    }

    /// Toggle auto-apply on device changes
    pub fn set_enabled(&self, enabled: bool) -> EngineResult<()> {
        self.send_command(Command::SetEnabled(enabled))
    }

    /// Request state update
    pub fn request_state(&self) -> EngineResult<()> {
        self.send_command(Command::RequestState)
    }

    /// Subscribe to engine events
    ///
    /// The first event received is the current state.
    pub fn subscribe(&self) -> EngineResult<Receiver<Event>> {
        let (sender, receiver) = unbounded();
        self.send_command(Command::Subscribe(sender))?;
        Ok(receiver)
    }

    /// Cloneable handle for driving the engine from other threads
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            command_sender: self.command_sender.clone(),
        }
    }

    /// Get current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop the control thread and remove all hardware listeners
    pub fn shutdown(&mut self) -> EngineResult<()> {
        let handle = self.control_thread.take().ok_or(EngineError::ShutDown)?;
        let _ = self.command_sender.send(Command::Shutdown);
        if handle.join().is_err() {
            error!("Control thread panicked");
        }
        Ok(())
    }

    /// Send command to control thread
    fn send_command(&self, command: Command) -> EngineResult<()> {
        if self.control_thread.is_none() {
            return Err(EngineError::ShutDown);
        }
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }

    /// Control thread main loop
    fn control_thread_main(
        mut service: RoutingService,
        mut notifier: HardwareNotifier,
        command_receiver: Receiver<Command>,
    ) {
        info!("Control thread started");

        let mut observers: Vec<Sender<Event>> = Vec::new();
        let mut published = service.state();

        loop {
            // Sleep until the next command or timer deadline
            let received = match service.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match command_receiver.recv_timeout(timeout) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match command_receiver.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            let mut force_state = false;
            if let Some(command) = received {
                let now = Instant::now();
                match command {
                    Command::StartMonitoring => service.start_monitoring(),
                    Command::StopMonitoring => service.stop_monitoring(),
                    Command::ApplyRoutingRule => service.apply_routing_rule(now),
                    Command::UserSelectedInput(id) => service.user_selected_input(id, now),
                    Command::SetEnabled(enabled) => service.set_enabled(enabled, now),
                    Command::Hardware(kind) => service.handle_hardware_event(kind, now),
                    Command::Subscribe(sender) => {
                        debug!("Observer subscribed");
                        if sender.send(Event::StateUpdate(service.state())).is_ok() {
                            observers.push(sender);
                        }
                    }
                    Command::RequestState => force_state = true,
                    Command::Shutdown => {
                        info!("Shutting down control thread");
                        break;
                    }
                }
            }

            service.poll_timers(Instant::now());
            Self::publish(&mut service, &mut observers, &mut published, force_state);
        }

        // Teardown: no callback may reach the engine after this point
        service.stop_monitoring();
        notifier.detach(service.hardware_mut());
        Self::publish(&mut service, &mut observers, &mut published, false);

        info!("Control thread stopped");
    }

    /// Forward queued events, then the state if it changed
    fn publish(
        service: &mut RoutingService,
        observers: &mut Vec<Sender<Event>>,
        published: &mut RouterState,
        force_state: bool,
    ) {
        let mut events = service.take_events();
        let state = service.state();
        if force_state || state != *published {
            *published = state.clone();
            events.push(Event::StateUpdate(state));
        }
        if events.is_empty() {
            return;
        }

        for event in events {
            // Drop observers whose receiver is gone
            observers.retain(|observer| observer.send(event.clone()).is_ok());
        }
        if observers.is_empty() {
            debug!("No observers subscribed");
        }
    }
}

/// Cloneable command handle for a running `RouterEngine`
///
/// Handles do not keep the control thread alive; once the engine shuts down
/// every call returns `EngineError::ShutDown`.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    command_sender: Sender<Command>,
}

impl EngineHandle {
    pub fn apply_routing_rule(&self) -> EngineResult<()> {
        self.send_command(Command::ApplyRoutingRule)
    }

    pub fn user_selected_input(&self, id: DeviceId) -> EngineResult<()> {
        self.send_command(Command::UserSelectedInput(id))
    }

    pub fn set_enabled(&self, enabled: bool) -> EngineResult<()> {
        self.send_command(Command::SetEnabled(enabled))
    }

    /// Subscribe to engine events; the first event is the current state
    pub fn subscribe(&self) -> EngineResult<Receiver<Event>> {
        let (sender, receiver) = unbounded();
        self.send_command(Command::Subscribe(sender))?;
        Ok(receiver)
    }

    /// Current state, after every command sent before this call
    pub fn current_state(&self, timeout: Duration) -> EngineResult<RouterState> {
        let events = self.subscribe()?;
        match events.recv_timeout(timeout) {
            Ok(Event::StateUpdate(state)) => Ok(state),
            _ => Err(EngineError::ShutDown),
        }
    }

    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ShutDown)
    }
}

impl Drop for RouterEngine {
    fn drop(&mut self) {
        if self.control_thread.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("Engine shutdown failed: {}", e);
            }
        }
    }
}
