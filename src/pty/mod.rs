//! Pseudoterminal adapter.
//!
//! `PtyAdapter` is the platform-independent contract the Session Broker
//! programs against. The production backend (`system::SystemPty`) wraps
//! `portable-pty`; tests use an in-process fake so broker behavior can be
//! exercised without a real shell.

#[cfg(test)]
pub mod fake;
pub mod path_translate;
pub mod system;

use crate::error::PtyError;
use std::collections::HashMap;
use std::path::Path;

/// Shell kind requested by the client at WS-upgrade time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    /// The user's default login shell.
    Default,
    /// Bash explicitly.
    Bash,
    /// Zsh explicitly.
    Zsh,
    /// A WSL distribution on Windows.
    WslDistro,
}

/// Parameters for opening a new pty-backed shell.
#[derive(Debug, Clone)]
pub struct OpenParams {
    /// Which shell to launch.
    pub shell: ShellKind,
    /// WSL distribution name, when `shell == WslDistro`.
    pub distro: Option<String>,
    /// Starting directory; translated from a Windows UNC WSL path first if needed.
    pub cwd: String,
    /// Extra environment variables to set on the child.
    pub env: HashMap<String, String>,
    /// Initial terminal columns.
    pub cols: u16,
    /// Initial terminal rows.
    pub rows: u16,
}

/// A handle to one open pty-backed child process.
///
/// All methods take `&self`: implementations guard their reader/writer/child
/// internally (a `Mutex` each), so the Broker can hold one `Arc<dyn
/// PtyHandle>` and call `read` from its dedicated output-pump thread while
/// `write`/`resize`/`close` are called concurrently from the input task,
/// without the two fighting over a single `&mut self`.
pub trait PtyHandle: Send + Sync {
    /// Read available output bytes into `buf`, returning the number read.
    /// Returns `Ok(0)` once the child has exited and all output is drained.
    /// Blocking; callers run this on a dedicated thread.
    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write input bytes to the child's stdin.
    fn write(&self, buf: &[u8]) -> std::io::Result<()>;

    /// Resize the pty. Safe to call concurrently with `read`/`write`;
    /// implementations coalesce rapid successive calls internally.
    fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError>;

    /// True once the child process has exited.
    fn is_done(&self) -> bool;

    /// Idempotent: kill the child (if still running) and release the pty.
    fn close(&self);
}

/// Factory for `PtyHandle`s. One implementation per platform/backend; the
/// broker is generic over this trait so tests can substitute a fake.
pub trait PtyAdapter: Send + Sync {
    /// Open a shell under a fresh pty per `params`.
    fn open(&self, params: &OpenParams) -> Result<std::sync::Arc<dyn PtyHandle>, PtyError>;
}

/// Validate and normalize a working directory prior to spawn. Exists so
/// `Open`'s `CwdInvalid` failure mode is exercised by both the real and
/// fake adapters the same way.
pub fn validate_cwd(raw_cwd: &str) -> Result<String, PtyError> {
    let translated = path_translate::translate_wsl_path(raw_cwd);
    if Path::new(&translated).is_dir() {
        Ok(translated)
    } else {
        Err(PtyError::CwdInvalid(translated))
    }
}
