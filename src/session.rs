//! Session child startup and readiness signaling.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use log::{info, warn};

/// Environment variable telling clients where the server listens.
pub const SOCKET_ENV: &str = "DISPLAY_SOCKET";

/// Candidate session scripts when no session argv was given, in order.
fn displayrc_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(".displayrc"));
    }
    candidates.push(PathBuf::from("/etc/displayrc"));
    candidates.push(PathBuf::from("/etc/default/displayrc"));
    candidates
}

/// Start the session child. Failure is logged and ignored; the server is
/// usable without a session, clients can still connect by hand.
pub fn spawn_session(argv: &[String], socket_path: &Path) -> Option<Child> {
    let mut command = if let Some(program) = argv.first() {
        let mut command = Command::new(program);
        command.args(&argv[1..]);
        command
    } else {
        let Some(script) = displayrc_candidates().into_iter().find(|p| p.exists()) else {
            info!("no session given and no displayrc found");
            return None;
        };
        Command::new(script)
    };
    command.env(SOCKET_ENV, socket_path);
    match command.spawn() {
        Ok(child) => {
            info!("session child started (pid {})", child.id());
            Some(child)
        }
        Err(err) => {
            warn!("failed to start session: {}", err);
            None
        }
    }
}

/// Tell the invoker we are ready to accept clients: one newline to the fd
/// named by READYFD, then close it.
pub fn notify_ready() {
    let Some(value) = env::var_os("READYFD") else { return };
    let Some(fd) = value.to_str().and_then(|s| s.parse::<i32>().ok()) else {
        warn!("READYFD is not a file descriptor number");
        return;
    };
    unsafe {
        libc::write(fd, b"\n".as_ptr() as *const libc::c_void, 1);
        libc::close(fd);
    }
}
