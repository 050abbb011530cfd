//! Control socket
//!
//! The running daemon listens on a Unix socket next to its settings file so
//! that CLI invocations act on the live engine instead of a private copy.
//! The protocol is one JSON request per line, answered by one JSON response
//! line.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use podrouter_core::{DeviceId, EngineHandle, RouterState};

/// How long a request waits for the control thread to report state
const STATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Socket file name, placed beside the settings file
pub const SOCKET_FILE_NAME: &str = "control.sock";

/// Requests accepted by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Select the input and keep it as the override
    SelectInput { id: DeviceId },
    /// Toggle auto-apply
    SetEnabled { enabled: bool },
    /// Schedule a routing pass
    Apply,
    /// Report the current state
    State,
}

/// Daemon reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", content = "payload", rename_all = "snake_case")]
pub enum ControlResponse {
    /// State after the request was processed
    State(RouterState),
    Error { message: String },
}

/// Forward `request` to the engine and report the resulting state
///
/// Blocks until the control thread has handled the request.
pub fn execute(handle: &EngineHandle, request: &ControlRequest) -> ControlResponse {
    let sent = match request {
        ControlRequest::SelectInput { id } => handle.user_selected_input(*id),
        ControlRequest::SetEnabled { enabled } => handle.set_enabled(*enabled),
        ControlRequest::Apply => handle.apply_routing_rule(),
        ControlRequest::State => Ok(()),
    };

    match sent.and_then(|()| handle.current_state(STATE_TIMEOUT)) {
        Ok(state) => ControlResponse::State(state),
        Err(e) => ControlResponse::Error {
            message: e.to_string(),
        },
    }
}

/// Bind the control socket, replacing a stale socket file
///
/// Fails with `AddrInUse` when another daemon is answering on `path`.
pub async fn bind(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("another podrouter daemon is listening on {}", path.display()),
            ));
        }
        debug!("Removing stale control socket {:?}", path);
        fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(path)?;
    info!("Control socket listening on {:?}", path);
    Ok(listener)
}

/// Accept connections until the task is aborted
pub async fn serve(listener: UnixListener, handle: EngineHandle) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, handle).await {
                        warn!("Control connection failed: {}", e);
                    }
                });
            }
            Err(e) => warn!("Control socket accept failed: {}", e),
        }
    }
}

async fn handle_connection(stream: UnixStream, handle: EngineHandle) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => {
                debug!("Control request: {:?}", request);
                let handle = handle.clone();
                tokio::task::spawn_blocking(move || execute(&handle, &request))
                    .await
                    .unwrap_or_else(|e| ControlResponse::Error {
                        message: e.to_string(),
                    })
            }
            Err(e) => ControlResponse::Error {
                message: format!("Malformed request: {}", e),
            },
        };
        write_line(&mut writer, &response).await?;
    }
    Ok(())
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let mut payload = serde_json::to_string(message)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await
}

/// Send `request` to the daemon listening on `path`
///
/// Returns `Ok(None)` when no daemon is running.
pub async fn request(path: &Path, request: &ControlRequest) -> io::Result<Option<ControlResponse>> {
    let stream = match UnixStream::connect(path).await {
        Ok(stream) => stream,
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ) =>
        {
            return Ok(None)
        }
        Err(e) => return Err(e),
    };

    let (reader, mut writer) = stream.into_split();
    write_line(&mut writer, request).await?;

    match BufReader::new(reader).lines().next_line().await? {
        Some(line) => Ok(Some(serde_json::from_str(&line)?)),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "daemon closed the connection",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use podrouter_core::{EngineConfig, Event, RouterEngine};
    use podrouter_platform::{DeviceRole, HardwareEventKind, MockDevice, MockHardware};

    const AIRPODS: DeviceId = 1;
    const MAC_MIC: DeviceId = 2;
    const SHURE: DeviceId = 99;

    fn engine() -> (MockHardware, RouterEngine) {
        let mock = MockHardware::with_devices(vec![
            MockDevice::bluetooth_headset(AIRPODS, "AirPods Pro"),
            MockDevice::builtin_mic(MAC_MIC, "MacBook Pro Microphone"),
            MockDevice::input(SHURE, "Shure MV7"),
        ]);
        let config = EngineConfig {
            debounce_interval: Duration::from_millis(20),
            stabilize_duration: Duration::from_millis(600),
            reselect_stabilize_duration: Duration::from_millis(300),
            stabilize_step: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let engine = RouterEngine::with_config(Box::new(mock.clone()), config).unwrap();
        (mock, engine)
    }

    fn wait_until_stabilizing(engine: &RouterEngine) {
        let events = engine.subscribe().unwrap();
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(Event::StateUpdate(state)) if state.is_stabilizing => return,
                Ok(_) => continue,
                Err(e) => panic!("Engine never started stabilizing: {}", e),
            }
        }
    }

    async fn serve_in(dir: &Path, engine: &RouterEngine) -> tokio::task::JoinHandle<()> {
        let listener = bind(&dir.join(SOCKET_FILE_NAME)).await.unwrap();
        tokio::spawn(serve(listener, engine.handle()))
    }

    fn expect_state(response: Option<ControlResponse>) -> RouterState {
        match response {
            Some(ControlResponse::State(state)) => state,
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_selection_reaches_running_engine() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, engine) = engine();
        engine.start_monitoring().unwrap();
        engine.apply_routing_rule().unwrap();
        wait_until_stabilizing(&engine);

        let server = serve_in(dir.path(), &engine).await;
        let socket = dir.path().join(SOCKET_FILE_NAME);
        let state = expect_state(
            request(&socket, &ControlRequest::SelectInput { id: SHURE })
                .await
                .unwrap(),
        );
        assert_eq!(state.last_action, "Input → Shure MV7 (manual)");
        assert!(!state.is_stabilizing);

        // Neither the old stabilization window nor a later device change
        // may put the built-in mic back
        std::thread::sleep(Duration::from_millis(200));
        mock.fire(HardwareEventKind::DeviceListChanged);
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(mock.current_default(DeviceRole::Input), Some(SHURE));

        server.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_toggle_reaches_running_engine() {
        let dir = tempfile::tempdir().unwrap();
        let (mock, engine) = engine();
        engine.start_monitoring().unwrap();

        let server = serve_in(dir.path(), &engine).await;
        let socket = dir.path().join(SOCKET_FILE_NAME);
        let state = expect_state(
            request(&socket, &ControlRequest::SetEnabled { enabled: false })
                .await
                .unwrap(),
        );
        assert!(!state.is_enabled);

        mock.connect(MockDevice::bluetooth_headset(3, "Beats Fit Pro"));
        std::thread::sleep(Duration::from_millis(200));
        assert!(mock.writes().is_empty());

        let state = expect_state(request(&socket, &ControlRequest::State).await.unwrap());
        assert_eq!(state.bluetooth_outputs.len(), 2);

        server.abort();
    }

    #[tokio::test]
    async fn test_no_daemon_running() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join(SOCKET_FILE_NAME);
        assert_eq!(request(&socket, &ControlRequest::State).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join(SOCKET_FILE_NAME);
        drop(bind(&socket).await.unwrap());
        assert!(socket.exists());

        // Nobody answers on the leftover file, so it is replaced
        let _listener = bind(&socket).await.unwrap();
        let second = bind(&socket).await;
        assert_eq!(second.unwrap_err().kind(), io::ErrorKind::AddrInUse);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_request_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (_mock, engine) = engine();
        let server = serve_in(dir.path(), &engine).await;

        let stream = UnixStream::connect(dir.path().join(SOCKET_FILE_NAME))
            .await
            .unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"request\":\"reboot\"}\n").await.unwrap();
        let line = BufReader::new(reader).lines().next_line().await.unwrap().unwrap();
        let response: ControlResponse = serde_json::from_str(&line).unwrap();
        assert!(matches!(response, ControlResponse::Error { message } if message.starts_with("Malformed")));

        server.abort();
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&ControlRequest::SelectInput { id: 99 }).unwrap();
        assert_eq!(json, r#"{"request":"select_input","id":99}"#);
    }
}
