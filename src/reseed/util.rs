use anyhow::Result;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Run `cmd` capturing its output, killing it if it outlives `timeout_secs`.
pub fn run_command_with_optional_timeout(
    cmd: &mut Command,
    timeout_secs: Option<u64>,
) -> Result<Output> {
    cmd.stdin(Stdio::null());
    let Some(timeout_secs) = timeout_secs else {
        return Ok(cmd.output()?);
    };
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let started = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(child.wait_with_output()?);
        }
        if started.elapsed() >= Duration::from_secs(timeout_secs) {
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("command timed out after {}s", timeout_secs);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_output_within_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello"]);
        let out = run_command_with_optional_timeout(&mut cmd, Some(5)).expect("run");
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[test]
    fn kills_commands_that_overrun() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_command_with_optional_timeout(&mut cmd, Some(1)).expect_err("timeout");
        assert!(err.to_string().contains("timed out"));
    }
}
