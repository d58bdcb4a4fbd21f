//! Control-channel wire types for the terminal WebSocket.
//!
//! Binary frames are raw PTY bytes in both directions. Text frames from
//! the client carry control JSON; today the only recognized shape is a
//! resize request.

use serde::Deserialize;

/// Shell config carried in the WS upgrade's query string.
#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeQuery {
    /// Shell kind: `"default" | "bash" | "zsh" | "wsl"`.
    #[serde(default)]
    pub shell: Option<String>,
    /// WSL distribution name, when `shell == "wsl"`.
    #[serde(default)]
    pub distro: Option<String>,
    /// Starting directory override.
    #[serde(default)]
    pub home: Option<String>,
    /// Opaque client-stable tab identifier.
    pub tab_id: String,
}

impl UpgradeQuery {
    /// Parse `shell` into the closed `ShellKind` enum, defaulting to the
    /// user's login shell when absent or unrecognized.
    #[must_use]
    pub fn shell_kind(&self) -> crate::pty::ShellKind {
        match self.shell.as_deref() {
            Some("bash") => crate::pty::ShellKind::Bash,
            Some("zsh") => crate::pty::ShellKind::Zsh,
            Some("wsl") => crate::pty::ShellKind::WslDistro,
            _ => crate::pty::ShellKind::Default,
        }
    }
}

/// Control messages a client may send as a WS text frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Resize the pty to the given dimensions.
    Resize {
        /// New column count.
        cols: u16,
        /// New row count.
        rows: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resize_control_message() {
        let msg: ControlMessage = serde_json::from_str(r#"{"type":"resize","cols":200,"rows":50}"#).unwrap();
        match msg {
            ControlMessage::Resize { cols, rows } => {
                assert_eq!(cols, 200);
                assert_eq!(rows, 50);
            }
        }
    }

    #[test]
    fn shell_kind_defaults_when_absent() {
        let query = UpgradeQuery {
            shell: None,
            distro: None,
            home: None,
            tab_id: "T1".into(),
        };
        assert_eq!(query.shell_kind(), crate::pty::ShellKind::Default);
    }

    #[test]
    fn shell_kind_recognizes_wsl() {
        let query = UpgradeQuery {
            shell: Some("wsl".into()),
            distro: Some("Ubuntu".into()),
            home: None,
            tab_id: "T1".into(),
        };
        assert_eq!(query.shell_kind(), crate::pty::ShellKind::WslDistro);
    }
}
