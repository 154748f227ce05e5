// External data-source emulator process
//
// The emulator replays a recorded study onto the serial ports the session
// reads from. It is started from a command template and stopped with
// terminate, a grace period, then kill.

use crate::storage::Dataset;
use crate::streaming::types::{StreamError, StreamResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Time given to the emulator to exit after being asked to terminate
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Expand `{dataset}` and `{number}` in a command template into argv
pub fn build_command_line(template: &str, dataset: Dataset, study_number: u32) -> Vec<String> {
    template
        .split_whitespace()
        .map(|part| {
            part.replace("{dataset}", dataset.as_str())
                .replace("{number}", &study_number.to_string())
        })
        .collect()
}

pub struct Emulator {
    child: Child,
}

impl Emulator {
    pub fn spawn(template: &str, dataset: Dataset, study_number: u32) -> StreamResult<Self> {
        let argv = build_command_line(template, dataset, study_number);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| StreamError::Emulator("empty emulator command".to_string()))?;

        info!("Starting emulator: {}", argv.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StreamError::Emulator(format!("failed to spawn {}: {}", program, e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr));
        }

        Ok(Self { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Terminate, wait up to [`TERMINATE_GRACE`], then kill
    pub async fn stop(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                info!("Emulator already exited with {}", status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to poll emulator status: {}", e),
        }

        self.terminate().await;
        match tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!("Emulator exited with {}", status),
            Ok(Err(e)) => warn!("Failed to wait for emulator: {}", e),
            Err(_) => {
                warn!("Emulator did not exit within {:?}, killing", TERMINATE_GRACE);
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill emulator: {}", e);
                }
            }
        }
    }

    #[cfg(unix)]
    async fn terminate(&mut self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        // SAFETY: plain syscall on a pid we spawned and have not yet reaped
        let rc = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if rc != 0 {
            warn!(
                "Failed to send SIGTERM to emulator {}: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to stop emulator: {}", e);
        }
    }
}

async fn forward_output<R: AsyncRead + Unpin>(output: R) {
    let mut lines = BufReader::new(output).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!("[emulator] {}", line.trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_line() {
        let argv = build_command_line(
            "python emulator.py {dataset} {number} --root ./data",
            Dataset::Hypoxia,
            7,
        );
        assert_eq!(
            argv,
            vec!["python", "emulator.py", "hypoxia", "7", "--root", "./data"]
        );
    }

    #[test]
    fn test_empty_template_is_rejected() {
        assert!(matches!(
            Emulator::spawn("   ", Dataset::Regular, 1),
            Err(StreamError::Emulator(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_terminates_within_grace() {
        let emulator = Emulator::spawn("sleep 30", Dataset::Regular, 1).unwrap();
        assert!(emulator.id().is_some());

        // SIGTERM ends `sleep` at once; falling back to kill would take the full grace
        let started = std::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(10), emulator.stop())
            .await
            .unwrap();
        assert!(started.elapsed() < TERMINATE_GRACE);
    }
}
