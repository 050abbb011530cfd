//! Launch-at-login registration
//!
//! On macOS the daemon registers itself as a per-user LaunchAgent:
//! `~/Library/LaunchAgents/<label>.plist` with `RunAtLoad`. launchd reads the
//! directory at login, so registering never starts a second copy next to the
//! daemon that is already running, and unregistering never stops it. Failures
//! are reported to the caller, who logs them; they are never fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use tracing::{info, warn};

use crate::error::PlatformError;

/// Default LaunchAgent label
pub const DEFAULT_LABEL: &str = "com.podrouter.daemon";

/// Launch-at-login collaborator
pub trait LoginItem {
    /// Register the application to start at login
    fn enable(&self) -> Result<(), PlatformError>;

    /// Remove the login registration
    fn disable(&self) -> Result<(), PlatformError>;

    /// Whether the application is currently registered
    fn is_enabled(&self) -> bool;
}

/// Per-user LaunchAgent
#[derive(Debug, Clone)]
pub struct LaunchAgent {
    label: String,
    program: PathBuf,
    plist_path: PathBuf,
}

impl LaunchAgent {
    /// LaunchAgent for the currently running executable
    pub fn for_current_exe() -> Result<Self, PlatformError> {
        let program = std::env::current_exe()?;
        let home = BaseDirs::new()
            .ok_or_else(|| PlatformError::InitializationFailed("No home directory".into()))?;
        let plist_path = home
            .home_dir()
            .join("Library")
            .join("LaunchAgents")
            .join(format!("{DEFAULT_LABEL}.plist"));

        Ok(Self::with_paths(DEFAULT_LABEL, program, plist_path))
    }

    /// LaunchAgent with explicit locations
    pub fn with_paths(label: &str, program: PathBuf, plist_path: PathBuf) -> Self {
        Self {
            label: label.to_string(),
            program,
            plist_path,
        }
    }

    pub fn plist_path(&self) -> &Path {
        &self.plist_path
    }

    /// Render the property list registered with launchd
    pub fn render_plist(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{program}</string>
        <string>run</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>ProcessType</key>
    <string>Interactive</string>
</dict>
</plist>
"#,
            label = escape_xml(&self.label),
            program = escape_xml(&self.program.to_string_lossy()),
        )
    }

    fn write_plist(&self) -> Result<(), PlatformError> {
        if let Some(parent) = self.plist_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.plist_path, self.render_plist())?;
        Ok(())
    }
}

impl LoginItem for LaunchAgent {
    /// Takes effect at the next login
    fn enable(&self) -> Result<(), PlatformError> {
        ensure_launchd()?;
        if let Err(e) = self.write_plist() {
            // A partial plist would still report as registered
            if let Err(cleanup) = fs::remove_file(&self.plist_path) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!("[LaunchAtLogin] Failed to remove partial plist: {}", cleanup);
                }
            }
            return Err(e);
        }
        info!("[LaunchAtLogin] Registered {}", self.label);
        Ok(())
    }

    fn disable(&self) -> Result<(), PlatformError> {
        if !self.plist_path.exists() {
            return Ok(());
        }
        fs::remove_file(&self.plist_path)?;
        info!("[LaunchAtLogin] Unregistered {}", self.label);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.plist_path.is_file()
    }
}

#[cfg(target_os = "macos")]
fn ensure_launchd() -> Result<(), PlatformError> {
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn ensure_launchd() -> Result<(), PlatformError> {
    Err(PlatformError::FeatureNotAvailable(
        "Launch agents require macOS".into(),
    ))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_in(dir: &Path) -> LaunchAgent {
        LaunchAgent::with_paths(
            "com.example.test",
            PathBuf::from("/Applications/Pod & Router/podrouter"),
            dir.join("LaunchAgents").join("com.example.test.plist"),
        )
    }

    #[test]
    fn test_render_plist() {
        let dir = tempfile::tempdir().unwrap();
        let plist = agent_in(dir.path()).render_plist();
        assert!(plist.contains("<string>com.example.test</string>"));
        assert!(plist.contains("Pod &amp; Router"));
        assert!(plist.contains("<key>RunAtLoad</key>"));
    }

    #[test]
    fn test_not_enabled_without_plist() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_in(dir.path());
        assert!(!agent.is_enabled());
        // Disabling an absent agent is a no-op
        assert!(agent.disable().is_ok());
    }

    #[test]
    fn test_write_plist_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_in(dir.path());
        agent.write_plist().unwrap();
        assert!(agent.is_enabled());
        let contents = fs::read_to_string(agent.plist_path()).unwrap();
        assert_eq!(contents, agent.render_plist());
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_enable_and_disable() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_in(dir.path());
        agent.enable().unwrap();
        assert!(agent.is_enabled());
        agent.disable().unwrap();
        assert!(!agent.is_enabled());
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_failed_enable_leaves_no_registration() {
        let dir = tempfile::tempdir().unwrap();
        // The LaunchAgents "directory" is a plain file, so the plist cannot be written
        fs::write(dir.path().join("LaunchAgents"), "").unwrap();
        let agent = agent_in(dir.path());

        assert!(agent.enable().is_err());
        assert!(!agent.is_enabled());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_enable_unavailable_off_macos() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_in(dir.path());
        assert!(matches!(
            agent.enable(),
            Err(PlatformError::FeatureNotAvailable(_))
        ));
    }
}
