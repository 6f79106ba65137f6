//! Child-process helpers shared across the workspace.
//!
//! Spawning goes through [`tokio_command`] so Windows children never open a
//! console window, and shutdown goes through [`shutdown_child`] so a capture
//! process gets a chance to finalize its output before being killed.

use std::ffi::OsStr;
use std::time::Duration;

use tokio::process::Child;
use tracing::warn;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Ask a child process to terminate gracefully.
///
/// On Unix this delivers `SIGTERM`, which lets tools like yt-dlp flush and
/// close their output files. On other targets there is no graceful signal,
/// so the child is killed outright.
pub fn terminate(child: &Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: plain kill(2) on a pid we own; no memory is touched.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        // id() is None once the child has been reaped; nothing to signal.
    }
    #[cfg(not(unix))]
    {
        let _ = child.id();
    }
}

/// Terminate a child gracefully and wait for it to exit.
///
/// Sends the graceful signal, waits up to `grace`, then falls back to a hard
/// kill. Returns the exit code when one is available.
pub async fn shutdown_child(child: &mut Child, grace: Duration) -> Option<i32> {
    terminate(child);
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        Ok(Err(e)) => {
            warn!("error waiting for terminated child: {e}");
            None
        }
        Err(_) => {
            warn!("child did not exit within {grace:?}, killing");
            let _ = child.kill().await;
            child.wait().await.ok().and_then(|s| s.code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_terminates_sleeping_child() {
        let mut child = tokio_command("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");

        let started = std::time::Instant::now();
        shutdown_child(&mut child, Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_collects_already_exited_child() {
        let mut child = tokio_command("true").spawn().expect("spawn true");
        // Give the child time to exit before we ask it to stop.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let code = shutdown_child(&mut child, Duration::from_secs(5)).await;
        assert_eq!(code, Some(0));
    }
}
