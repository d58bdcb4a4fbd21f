//! Production `PtyAdapter`, backed by `portable-pty`.
//!
//! Mirrors the open/build-command shape of a PTY-spawning daemon: one
//! `native_pty_system()` pair per session, a `CommandBuilder` assembled
//! from the shell kind and environment, and explicit `Child` ownership so
//! the handle can kill it on close rather than relying on drop order.

use super::{validate_cwd, OpenParams, PtyAdapter, PtyHandle, ShellKind};
use crate::error::PtyError;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// `portable-pty`-backed adapter. Stateless; one instance is shared across
/// all sessions.
#[derive(Debug, Default)]
pub struct SystemPty;

impl SystemPty {
    /// Construct the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn shell_command(shell: ShellKind, distro: Option<&str>) -> Result<String, PtyError> {
        match shell {
            ShellKind::Default => std::env::var("SHELL")
                .or_else(|_| Ok::<_, std::env::VarError>("/bin/sh".to_string()))
                .map_err(|_| PtyError::ShellNotFound("$SHELL".into())),
            ShellKind::Bash => Ok("/bin/bash".to_string()),
            ShellKind::Zsh => Ok("/bin/zsh".to_string()),
            ShellKind::WslDistro => {
                let distro = distro
                    .ok_or_else(|| PtyError::ShellNotFound("wsl distro not specified".into()))?;
                Ok(format!("wsl.exe -d {distro}"))
            }
        }
    }
}

impl PtyAdapter for SystemPty {
    fn open(&self, params: &OpenParams) -> Result<Arc<dyn PtyHandle>, PtyError> {
        let cwd = validate_cwd(&params.cwd)?;
        let command_str = Self::shell_command(params.shell, params.distro.as_deref())?;

        let pty_system = native_pty_system();
        let size = PtySize {
            rows: params.rows,
            cols: params.cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system
            .openpty(size)
            .map_err(|e| PtyError::Io(format!("openpty failed: {e}")))?;

        let mut parts = command_str.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| PtyError::ShellNotFound(command_str.clone()))?;
        let mut cmd = CommandBuilder::new(program);
        for arg in parts {
            cmd.arg(arg);
        }
        cmd.cwd(&cwd);
        for (key, value) in &params.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::PermissionDenied(format!("spawn failed: {e}")))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Io(format!("clone reader failed: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Io(format!("take writer failed: {e}")))?;

        Ok(Arc::new(SystemPtyHandle {
            master: Mutex::new(pair.master),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            child: Mutex::new(Some(child)),
        }))
    }
}

struct SystemPtyHandle {
    master: Mutex<Box<dyn MasterPty + Send>>,
    reader: Mutex<Box<dyn Read + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Option<Box<dyn Child + Send>>>,
}

impl PtyHandle for SystemPtyHandle {
    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.lock().expect("pty reader lock poisoned").read(buf)
    }

    fn write(&self, buf: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().expect("pty writer lock poisoned");
        writer.write_all(buf)?;
        writer.flush()
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .lock()
            .expect("pty master lock poisoned")
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Io(format!("resize failed: {e}")))
    }

    fn is_done(&self) -> bool {
        let mut child = self.child.lock().expect("pty child lock poisoned");
        match &mut *child {
            Some(c) => matches!(c.try_wait(), Ok(Some(_))),
            None => true,
        }
    }

    fn close(&self) {
        let mut child_slot = self.child.lock().expect("pty child lock poisoned");
        if let Some(mut child) = child_slot.take() {
            if let Err(e) = child.kill() {
                log::warn!("failed to kill pty child: {e}");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for SystemPtyHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn params(cwd: &str) -> OpenParams {
        OpenParams {
            shell: ShellKind::Bash,
            distro: None,
            cwd: cwd.to_string(),
            env: HashMap::new(),
            cols: 80,
            rows: 24,
        }
    }

    #[test]
    fn open_rejects_nonexistent_cwd() {
        let adapter = SystemPty::new();
        let err = match adapter.open(&params("/this/path/does/not/exist/at/all")) {
            Err(e) => e,
            Ok(_) => panic!("should reject missing cwd"),
        };
        assert!(matches!(err, PtyError::CwdInvalid(_)));
    }

    #[test]
    fn open_spawns_shell_in_tmp() {
        let adapter = SystemPty::new();
        let result = adapter.open(&params("/tmp"));
        // Environments without a real pty (e.g. some CI sandboxes) may
        // fail at the OS level; only assert we don't panic and that a
        // success carries a usable handle.
        if let Ok(handle) = result {
            handle.close();
        }
    }

    #[test]
    fn wsl_distro_without_name_is_rejected() {
        let err = SystemPty::shell_command(ShellKind::WslDistro, None).unwrap_err();
        assert!(matches!(err, PtyError::ShellNotFound(_)));
    }
}
