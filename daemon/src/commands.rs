//! Subcommand handlers
//!
//! Each handler wires settings, the hardware backend and the core engine
//! together for one CLI entry point.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use tracing::{error, info, warn};

use podrouter_core::{
    DeviceCatalog, DeviceId, EngineConfig, Event, RouterEngine, RouterSettings, RouterState,
    RoutingService, RoutingSnapshot,
};
use podrouter_platform::{get_backend, LaunchAgent, LoginItem};

use crate::control::{self, ControlRequest, ControlResponse, SOCKET_FILE_NAME};

fn load_settings(path: Option<&Path>) -> RouterSettings {
    match path {
        Some(path) => RouterSettings::load_from(path),
        None => RouterSettings::load(),
    }
}

fn save_settings(settings: &RouterSettings, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => settings.save_to(path),
        None => settings.save(),
    }
    .context("Failed to save settings")
}

/// Control socket of the daemon that uses these settings
fn control_socket_path(settings_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    let settings = match settings_path {
        Some(path) => path.to_path_buf(),
        None => RouterSettings::get_config_path().context("Could not determine config path")?,
    };
    Ok(settings.with_file_name(SOCKET_FILE_NAME))
}

/// Send `request` to the running daemon, if there is one
async fn send_to_daemon(
    settings_path: Option<&Path>,
    request: ControlRequest,
) -> anyhow::Result<Option<RouterState>> {
    let socket = control_socket_path(settings_path)?;
    match control::request(&socket, &request)
        .await
        .context("Failed to reach the running daemon")?
    {
        Some(ControlResponse::State(state)) => Ok(Some(state)),
        Some(ControlResponse::Error { message }) => anyhow::bail!("Daemon error: {}", message),
        None => Ok(None),
    }
}

/// Run the routing daemon until Ctrl-C
pub async fn run(settings_path: Option<&Path>) -> anyhow::Result<()> {
    let settings = load_settings(settings_path);
    let backend = get_backend().context("No audio backend for this platform")?;
    info!("Using {} backend", backend.name());

    let mut engine = RouterEngine::with_config(backend, settings.engine_config())?;
    let events = engine.subscribe()?;

    let socket = control_socket_path(settings_path)?;
    let listener = control::bind(&socket)
        .await
        .with_context(|| format!("Failed to bind control socket {}", socket.display()))?;
    let server = tokio::spawn(control::serve(listener, engine.handle()));

    if !settings.is_enabled {
        engine.set_enabled(false)?;
    }
    engine.start_monitoring()?;
    if settings.is_enabled {
        engine.apply_routing_rule()?;
    }

    // Ends once the control thread drops its observers
    let logger = tokio::task::spawn_blocking(move || {
        for event in events.iter() {
            log_event(&event);
        }
    });

    info!("podrouter running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    server.abort();
    if let Err(e) = fs::remove_file(&socket) {
        warn!("Failed to remove control socket: {}", e);
    }
    engine.stop_monitoring()?;
    engine.shutdown()?;
    if let Err(e) = logger.await {
        warn!("Event logger ended abnormally: {}", e);
    }
    Ok(())
}

fn log_event(event: &Event) {
    match event {
        Event::Error { message } => error!("{}", message),
        other => info!("{}", describe_event(other)),
    }
}

/// One-line description of an engine event
pub fn describe_event(event: &Event) -> String {
    match event {
        Event::StateUpdate(state) => format!(
            "{} (monitoring: {}, enabled: {}, stabilizing: {})",
            state.last_action, state.is_monitoring, state.is_enabled, state.is_stabilizing
        ),
        Event::RoutingApplied { output, input } => match input {
            Some(input) => format!("Routing applied: output {} / input {}", output, input),
            None => format!("Routing applied: output {} / input unchanged", output),
        },
        Event::InputReasserted { device } => format!("Input reasserted to {}", device),
        Event::StabilizationEnded { reason } => format!("Stabilization ended: {:?}", reason),
        Event::Error { message } => format!("Error: {}", message),
    }
}

/// Print the devices relevant to routing
pub fn devices(settings_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let settings = load_settings(settings_path);
    let backend = get_backend().context("No audio backend for this platform")?;
    let snapshot = DeviceCatalog::new(&settings.engine_config()).refresh(backend.as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_snapshot(&snapshot));
    }
    Ok(())
}

/// Human-readable device listing
pub fn render_snapshot(snapshot: &RoutingSnapshot) -> String {
    let mut out = String::new();
    let mark = |id: DeviceId| {
        if snapshot.default_input == Some(id) {
            " (default input)"
        } else {
            ""
        }
    };

    let _ = writeln!(out, "Bluetooth outputs:");
    if snapshot.bluetooth_outputs.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for device in &snapshot.bluetooth_outputs {
        let _ = writeln!(out, "  {:>5}  {}", device.id, device.name);
    }

    let _ = writeln!(out, "Inputs:");
    if snapshot.inputs.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for device in &snapshot.inputs {
        let _ = writeln!(out, "  {:>5}  {}{}", device.id, device.name, mark(device.id));
    }

    match &snapshot.builtin_mic {
        Some(mic) => {
            let _ = writeln!(out, "Built-in mic: {} ({})", mic.name, mic.id);
        }
        None => {
            let _ = writeln!(out, "Built-in mic: not found");
        }
    }
    out
}

/// Select the default input
///
/// A running daemon keeps the choice as its override. Without one the
/// selection is applied here and held only through the reselect window.
pub async fn select_input(settings_path: Option<&Path>, id: DeviceId) -> anyhow::Result<()> {
    if let Some(state) = send_to_daemon(settings_path, ControlRequest::SelectInput { id }).await? {
        println!("{}", state.last_action);
        return Ok(());
    }

    warn!("No running daemon, the selection is not remembered");
    let config = load_settings(settings_path).engine_config();
    let last_action = tokio::task::spawn_blocking(move || select_input_once(config, id)).await??;
    println!("{}", last_action);
    Ok(())
}

fn select_input_once(config: EngineConfig, id: DeviceId) -> anyhow::Result<String> {
    let backend = get_backend().context("No audio backend for this platform")?;
    let mut service = RoutingService::new(backend, config)?;

    service.start_monitoring();
    service.user_selected_input(id, Instant::now());

    while let Some(deadline) = service.next_deadline() {
        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
        service.poll_timers(Instant::now());
        for event in service.take_events() {
            log_event(&event);
        }
    }
    service.stop_monitoring();
    Ok(service.last_action().to_string())
}

/// Persist the auto-apply toggle and hand it to a running daemon
pub async fn set_enabled(settings_path: Option<&Path>, enabled: bool) -> anyhow::Result<()> {
    let mut settings = load_settings(settings_path);
    settings.is_enabled = enabled;
    save_settings(&settings, settings_path)?;
    println!("Automatic routing {}", if enabled { "enabled" } else { "disabled" });

    if send_to_daemon(settings_path, ControlRequest::SetEnabled { enabled })
        .await?
        .is_some()
    {
        println!("Running daemon updated");
    }
    Ok(())
}

/// Ask the running daemon for a routing pass
pub async fn apply(settings_path: Option<&Path>) -> anyhow::Result<()> {
    match send_to_daemon(settings_path, ControlRequest::Apply).await? {
        Some(_) => {
            println!("Routing scheduled");
            Ok(())
        }
        None => anyhow::bail!("No running daemon"),
    }
}

/// Print the running daemon's state
pub async fn status(settings_path: Option<&Path>) -> anyhow::Result<()> {
    match send_to_daemon(settings_path, ControlRequest::State).await? {
        Some(state) => {
            println!("{}", state.last_action);
            println!(
                "monitoring: {}, enabled: {}, stabilizing: {}, input: {}",
                state.is_monitoring,
                state.is_enabled,
                state.is_stabilizing,
                state
                    .selected_input_id
                    .map_or_else(|| "unknown".to_string(), |id| id.to_string())
            );
        }
        None => println!("No running daemon"),
    }
    Ok(())
}

/// Register or remove the login item and persist the flag
pub fn launch_at_login(settings_path: Option<&Path>, enabled: bool) -> anyhow::Result<()> {
    let agent = LaunchAgent::for_current_exe()?;
    if enabled {
        agent.enable()?;
    } else {
        agent.disable()?;
    }

    let mut settings = load_settings(settings_path);
    settings.launch_at_login = enabled;
    save_settings(&settings, settings_path)?;
    println!(
        "Launch at login {} (takes effect at next login)",
        if enabled { "on" } else { "off" }
    );
    Ok(())
}

pub fn launch_at_login_status() -> anyhow::Result<()> {
    let agent = LaunchAgent::for_current_exe()?;
    let state = if agent.is_enabled() { "on" } else { "off" };
    println!("Launch at login: {} ({})", state, agent.plist_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use podrouter_core::StopReason;
    use podrouter_platform::{DeviceRole, MockDevice, MockHardware};

    #[tokio::test]
    async fn test_set_enabled_persists_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        set_enabled(Some(path.as_path()), false).await.unwrap();
        assert!(!RouterSettings::load_from(&path).is_enabled);

        set_enabled(Some(path.as_path()), true).await.unwrap();
        assert!(RouterSettings::load_from(&path).is_enabled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_enabled_updates_running_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let engine = RouterEngine::new(Box::new(MockHardware::new())).unwrap();
        let listener = control::bind(&control_socket_path(Some(path.as_path())).unwrap())
            .await
            .unwrap();
        let server = tokio::spawn(control::serve(listener, engine.handle()));

        set_enabled(Some(path.as_path()), false).await.unwrap();
        let state = engine
            .handle()
            .current_state(std::time::Duration::from_secs(2))
            .unwrap();
        assert!(!state.is_enabled);

        server.abort();
    }

    #[test]
    fn test_socket_sits_beside_settings() {
        let socket = control_socket_path(Some(Path::new("/tmp/podrouter/settings.json"))).unwrap();
        assert_eq!(socket, Path::new("/tmp/podrouter/control.sock"));
    }

    #[tokio::test]
    async fn test_apply_requires_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert!(apply(Some(path.as_path())).await.is_err());
    }

    #[test]
    fn test_render_snapshot() {
        let mock = MockHardware::with_devices(vec![
            MockDevice::bluetooth_headset(1, "AirPods Pro"),
            MockDevice::builtin_mic(2, "MacBook Pro Microphone"),
        ]);
        mock.force_default(DeviceRole::Input, 2);
        let snapshot = DeviceCatalog::new(&EngineConfig::default()).refresh(&mock);

        let text = render_snapshot(&snapshot);
        assert!(text.contains("AirPods Pro"));
        assert!(text.contains("MacBook Pro Microphone (default input)"));
        assert!(text.contains("Built-in mic: MacBook Pro Microphone (2)"));
    }

    #[test]
    fn test_render_empty_snapshot() {
        let text = render_snapshot(&RoutingSnapshot::default());
        assert_eq!(text.matches("(none)").count(), 2);
        assert!(text.contains("Built-in mic: not found"));
    }

    #[test]
    fn test_describe_event() {
        let applied = Event::RoutingApplied {
            output: 1,
            input: None,
        };
        assert_eq!(
            describe_event(&applied),
            "Routing applied: output 1 / input unchanged"
        );

        let ended = Event::StabilizationEnded {
            reason: StopReason::OverrideChanged,
        };
        assert_eq!(describe_event(&ended), "Stabilization ended: OverrideChanged");
    }
}
