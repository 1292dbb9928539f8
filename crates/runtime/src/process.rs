//! Platform process liveness and termination helpers.
//!
//! Used by drivers that wrap a real automation process and by the
//! controller's post-kill liveness check.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

/// Returns `true` when a process with `pid` appears alive on this platform.
pub fn pid_is_alive(pid: u32) -> bool {
	#[cfg(unix)]
	{
		if pid == 0 {
			return false;
		}

		if PathBuf::from("/proc").join(pid.to_string()).exists() {
			return true;
		}

		Command::new("kill")
			.arg("-0")
			.arg(pid.to_string())
			.status()
			.map(|status| status.success())
			.unwrap_or(pid == std::process::id())
	}

	#[cfg(windows)]
	{
		let filter = format!("PID eq {pid}");
		Command::new("tasklist")
			.args(["/FI", &filter, "/FO", "CSV", "/NH"])
			.output()
			.ok()
			.filter(|output| output.status.success())
			.map(|output| String::from_utf8_lossy(&output.stdout).contains(&format!("\"{pid}\"")))
			.unwrap_or(pid == std::process::id())
	}

	#[cfg(not(any(unix, windows)))]
	{
		pid == std::process::id()
	}
}

/// Unconditionally kills `pid`.
pub fn force_kill(pid: u32) -> bool {
	debug!(target = "mb.process", pid, "forcing termination");

	#[cfg(unix)]
	{
		Command::new("kill")
			.args(["-KILL", &pid.to_string()])
			.status()
			.map(|status| status.success())
			.unwrap_or(false)
	}

	#[cfg(windows)]
	{
		Command::new("taskkill")
			.args(["/PID", &pid.to_string(), "/F"])
			.status()
			.map(|status| status.success())
			.unwrap_or(false)
	}

	#[cfg(not(any(unix, windows)))]
	{
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn current_process_is_alive() {
		assert!(pid_is_alive(std::process::id()));
	}

	#[cfg(unix)]
	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!pid_is_alive(0));
	}

	#[cfg(unix)]
	#[test]
	fn force_kill_stops_a_spawned_child() {
		let mut child = Command::new("sleep").arg("30").spawn().unwrap();
		let pid = child.id();
		assert!(pid_is_alive(pid));
		assert!(force_kill(pid));
		let _ = child.wait();
		assert!(!pid_is_alive(pid));
	}
}
