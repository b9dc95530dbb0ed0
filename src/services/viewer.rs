use crate::services::error::ServiceError;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::process::Command;

/// Opens a generated PDF for the person sitting at this machine.
#[async_trait::async_trait]
pub trait Viewer: Send + Sync {
    async fn open(&self, path: &Path) -> Result<(), ServiceError>;

    fn name(&self) -> &str;
}

/// Launches the desktop's default PDF application, or a configured command.
pub struct SystemViewer {
    command: Option<Vec<String>>,
}

impl SystemViewer {
    pub fn platform() -> Self {
        Self { command: None }
    }

    /// `command` is split on whitespace; the file path is appended as the last argument.
    pub fn with_command(command: &str) -> Self {
        let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        Self {
            command: (!parts.is_empty()).then_some(parts),
        }
    }

    fn command_for(&self, path: &Path) -> Command {
        if let Some(parts) = &self.command {
            let mut cmd = Command::new(&parts[0]);
            cmd.args(&parts[1..]).arg(path);
            return cmd;
        }

        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(path);
            cmd
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]).arg(path);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(path);
            cmd
        }
    }
}

#[async_trait::async_trait]
impl Viewer for SystemViewer {
    async fn open(&self, path: &Path) -> Result<(), ServiceError> {
        // Not awaited: the viewer outlives the request
        self.command_for(path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| ServiceError::Internal(format!("Could not launch viewer: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        match &self.command {
            Some(parts) => &parts[0],
            None => "system",
        }
    }
}

/// Records what would have been opened; used in tests and headless setups.
#[derive(Default)]
pub struct NoOpViewer {
    opened: Mutex<Vec<PathBuf>>,
}

impl NoOpViewer {
    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened
            .lock()
            .map(|opened| opened.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Viewer for NoOpViewer {
    async fn open(&self, path: &Path) -> Result<(), ServiceError> {
        tracing::warn!("NoOpViewer: not opening {} (headless mode)", path.display());
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(path.to_path_buf());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Factory function to create the viewer named in config
pub fn create_viewer(viewer: &str) -> Box<dyn Viewer> {
    match viewer.trim().to_lowercase().as_str() {
        "" | "system" | "default" => Box::new(SystemViewer::platform()),
        "noop" | "none" | "disabled" => Box::new(NoOpViewer::default()),
        _ => Box::new(SystemViewer::with_command(viewer.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_viewer() {
        assert_eq!(create_viewer("system").name(), "system");
        assert_eq!(create_viewer("NONE").name(), "noop");
        assert_eq!(create_viewer("evince --fullscreen").name(), "evince");
    }

    #[test]
    fn test_custom_command_appends_path() {
        let viewer = SystemViewer::with_command("evince --fullscreen");
        let cmd = viewer.command_for(Path::new("/tmp/a.pdf"));
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "evince");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec!["--fullscreen", "/tmp/a.pdf"]);
    }

    #[tokio::test]
    async fn test_noop_viewer_records() {
        let viewer = NoOpViewer::default();
        viewer.open(Path::new("/tmp/x.pdf")).await.unwrap();
        assert_eq!(viewer.opened(), vec![PathBuf::from("/tmp/x.pdf")]);
    }

    #[tokio::test]
    async fn test_missing_viewer_binary_is_an_error() {
        let viewer = SystemViewer::with_command("/nonexistent/pdf-viewer");
        assert!(viewer.open(Path::new("/tmp/a.pdf")).await.is_err());
    }
}
