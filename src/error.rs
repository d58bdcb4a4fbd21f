//! Typed error taxonomy for the observability core.
//!
//! Mirrors the error kinds a conforming implementation must distinguish so
//! each component can apply its own handling policy (close the session with
//! a specific code, log and increment a counter, or return a typed miss).
//! Hand-written `Display`/`Error` impls, no derive macro — the conventions
//! to apply at call sites live with each caller, not inside a derive.

use std::fmt;

/// Errors raised while opening or operating a PTY.
#[derive(Debug)]
pub enum PtyError {
    /// The requested shell binary does not exist or is not executable.
    ShellNotFound(String),
    /// The working directory does not exist or is not a directory.
    CwdInvalid(String),
    /// The OS denied permission to spawn the process or open the pty.
    PermissionDenied(String),
    /// This platform has no adapter backend.
    PlatformUnsupported,
    /// A read or write on an open pty failed.
    Io(String),
}

impl fmt::Display for PtyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShellNotFound(s) => write!(f, "shell not found: {s}"),
            Self::CwdInvalid(s) => write!(f, "invalid working directory: {s}"),
            Self::PermissionDenied(s) => write!(f, "permission denied: {s}"),
            Self::PlatformUnsupported => write!(f, "platform unsupported"),
            Self::Io(s) => write!(f, "pty io error: {s}"),
        }
    }
}

impl std::error::Error for PtyError {}

/// Reason a session's WebSocket was closed, carrying the wire close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client or server closed normally.
    Normal,
    /// The PTY's child process exited.
    PtyExited,
    /// The session's 24h hard cap elapsed.
    SessionTimeout,
    /// A read or write on the pty failed.
    PtyIoError,
}

impl CloseReason {
    /// The WebSocket close code for this reason, per the wire protocol.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::PtyExited => 4000,
            Self::SessionTimeout => 4001,
            Self::PtyIoError => 4002,
        }
    }
}

/// Errors raised by the conversation store.
#[derive(Debug)]
pub enum StoreError {
    /// No file exists for the requested (tab, conversation) pair.
    NotFound,
    /// The file exists but failed to parse as a conversation.
    Corrupt(String),
    /// The write or rename failed at the filesystem layer.
    WriteFailed(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "conversation not found"),
            Self::Corrupt(s) => write!(f, "conversation file corrupt: {s}"),
            Self::WriteFailed(s) => write!(f, "store write failed: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}
