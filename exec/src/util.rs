//! Small helpers shared by the concrete adapter backends.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::adapter::CancelSignal;
use crate::adapter::CommandOutput;
use crate::error::AdapterError;
use crate::error::Result;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// The largest byte offset `<= cap` that lands on a UTF-8 char boundary of
/// `s`. `String::truncate` panics on an offset that splits a multi-byte
/// character, so callers that truncate at a fixed byte cap (read_file's
/// size limit) must round down to one of these first.
pub fn floor_char_boundary(s: &str, cap: usize) -> usize {
    let mut cut = cap.min(s.len());
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

/// Spawn an already-configured [`Command`], collect its output, and enforce
/// the timeout/cancellation contract every backend must honor:
/// cancellation kills the child promptly, a timeout reports a non-zero exit
/// with a marker in `stderr` rather than raising.
pub async fn run(mut cmd: Command, timeout_ms: Option<u64>, cancel: CancelSignal) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let child = cmd.spawn()?;
    let duration = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));

    let wait = async {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AdapterError::Cancelled),
            result = child.wait_with_output() => Ok(result?),
        }
    };

    match timeout(duration, wait).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(CommandOutput {
            stdout: String::new(),
            stderr: format!("command timed out after {}ms", duration.as_millis()),
            exit_code: 124,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_char_boundary_rounds_down_out_of_a_multibyte_char() {
        let s = "aé"; // 'a' (1 byte) + 'é' (2 bytes), byte 2 splits 'é'
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(floor_char_boundary(s, 3), 3);
        assert_eq!(floor_char_boundary(s, 100), s.len());
    }

    #[tokio::test]
    async fn timeout_reports_a_nonzero_exit_instead_of_raising() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output = run(cmd, Some(50), CancelSignal::new()).await.expect("timeout is not an error");
        assert_eq!(output.exit_code, 124);
        assert!(output.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_child_promptly() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let cancel = CancelSignal::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel2.cancel();
        });

        let result = run(cmd, Some(5_000), cancel).await;
        assert!(matches!(result, Err(AdapterError::Cancelled)));
    }

    #[tokio::test]
    async fn successful_command_returns_stdout_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hi"]);
        let output = run(cmd, None, CancelSignal::new()).await.expect("run");
        assert_eq!(output.stdout.trim(), "hi");
        assert_eq!(output.exit_code, 0);
    }
}
