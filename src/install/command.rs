//! Install backend that opens the artifact with a system program.

use super::{InstallBackend, InstallRequest};
use crate::error::{DistributeError, ErrorExt, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Opens the artifact with an external program found on `PATH`
/// (`xdg-open` on Linux, `open` on macOS, `explorer` on Windows).
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    /// Uses `program` with `args`; the artifact path is appended last.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The platform's default opener.
    pub fn platform_default() -> Self {
        let program = if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(windows) {
            "explorer"
        } else {
            "xdg-open"
        };
        Self::new(program, Vec::new())
    }

    fn artifact_path(request: &InstallRequest) -> Option<PathBuf> {
        if request.file_uri.scheme() != "file" {
            return None;
        }
        request.file_uri.to_file_path().ok()
    }

    #[cfg(unix)]
    fn grant_read_access(path: &std::path::Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = std::fs::metadata(path)
            .fs_context("reading artifact permissions", path)?
            .permissions();
        permissions.set_mode(permissions.mode() | 0o444);
        std::fs::set_permissions(path, permissions).fs_context("granting read access", path)
    }

    #[cfg(not(unix))]
    fn grant_read_access(_path: &std::path::Path) -> Result<()> {
        Ok(())
    }
}

impl InstallBackend for CommandInstaller {
    fn resolves(&self, request: &InstallRequest) -> bool {
        let Some(path) = Self::artifact_path(request) else {
            log::debug!("Install request is not a local file: {}", request.file_uri);
            return false;
        };
        if !path.is_file() {
            log::debug!("Artifact missing at {}", path.display());
            return false;
        }
        match which::which(&self.program) {
            Ok(found) => {
                log::debug!("Found installer at: {}", found.display());
                true
            }
            Err(e) => {
                log::debug!("{} not found in PATH: {}", self.program, e);
                false
            }
        }
    }

    fn launch(&self, request: &InstallRequest) -> Result<()> {
        let path = Self::artifact_path(request).ok_or(DistributeError::InstallerNotFound)?;
        if request.grant_read_access {
            Self::grant_read_access(&path)?;
        }

        let program = which::which(&self.program).map_err(|e| DistributeError::Launch {
            program: self.program.clone(),
            reason: e.to_string(),
        })?;
        let mut child = Command::new(&program)
            .args(&self.args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DistributeError::Launch {
                program: program.display().to_string(),
                reason: e.to_string(),
            })?;

        // Reap the opener without blocking the caller.
        std::thread::spawn(move || {
            if let Err(e) = child.wait() {
                log::warn!("Installer process could not be awaited: {}", e);
            }
        });
        Ok(())
    }
}
