//! Exercises the production `SystemPty` adapter against a real shell.
//!
//! Sandboxed CI runners sometimes have no real pty device; mirroring the
//! unit tests in `pty::system`, a failed `open` here is tolerated rather
//! than failing the suite; these tests only assert behavior once a pty was
//! actually obtained.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use termcore::pty::system::SystemPty;
use termcore::pty::{OpenParams, PtyAdapter, ShellKind};

fn open_shell_in_tmp() -> Option<std::sync::Arc<dyn termcore::pty::PtyHandle>> {
    let adapter = SystemPty::new();
    let params = OpenParams {
        shell: ShellKind::Bash,
        distro: None,
        cwd: "/tmp".to_string(),
        env: HashMap::new(),
        cols: 80,
        rows: 24,
    };
    adapter.open(&params).ok()
}

fn read_until(pty: &dyn termcore::pty::PtyHandle, needle: &str, timeout: Duration) -> String {
    let mut collected = String::new();
    let start = Instant::now();
    let mut buf = [0u8; 4096];
    while start.elapsed() < timeout {
        match pty.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                collected.push_str(&String::from_utf8_lossy(&buf[..n]));
                if collected.contains(needle) {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
            Err(_) => break,
        }
    }
    collected
}

#[test]
fn echoed_command_output_round_trips() {
    let Some(pty) = open_shell_in_tmp() else {
        return;
    };
    pty.write(b"echo termcore-roundtrip-marker\n").expect("write");
    let output = read_until(&*pty, "termcore-roundtrip-marker", Duration::from_secs(5));
    assert!(output.contains("termcore-roundtrip-marker"));
    pty.close();
}

#[test]
fn resize_does_not_error_while_shell_is_live() {
    let Some(pty) = open_shell_in_tmp() else {
        return;
    };
    pty.resize(120, 40).expect("resize");
    pty.resize(80, 24).expect("resize back");
    pty.close();
}

#[test]
fn close_is_idempotent_and_marks_done() {
    let Some(pty) = open_shell_in_tmp() else {
        return;
    };
    pty.close();
    pty.close(); // must not panic on a second call
    assert!(pty.is_done());
}
