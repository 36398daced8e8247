//! `start`/`stop` for a detached background instance process, tracked by a
//! pidfile the way a small unit-file-free process supervisor would.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::instances::{log_path, pidfile_path};

pub struct CliError(pub String);

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError(e.to_string())
    }
}

fn read_pid(path: &PathBuf) -> io::Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.trim().parse().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 sends nothing; it only probes whether the pid exists
    // and is signalable by this process.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    false
}

/// Spawns `mflow run <instance>` detached from this process, redirecting its
/// stdio to a log file under the runtime directory, and records its pid.
pub fn start(instance_name: &str, config_file: Option<&std::path::Path>) -> Result<(), CliError> {
    let pidfile = pidfile_path(instance_name)?;
    if let Some(pid) = read_pid(&pidfile)? {
        if process_is_alive(pid) {
            return Err(CliError(format!(
                "instance '{instance_name}' is already running (pid {pid})"
            )));
        }
    }

    let log_file = fs::File::create(log_path(instance_name)?)?;
    let current_exe = std::env::current_exe()?;

    let mut command = Command::new(current_exe);
    command.arg("run").arg(instance_name);
    if let Some(path) = config_file {
        command.arg("--config_file").arg(path);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file.try_clone()?))
        .stderr(Stdio::from(log_file));

    let child = command
        .spawn()
        .map_err(|e| CliError(format!("spawning background instance: {e}")))?;

    fs::write(&pidfile, child.id().to_string())?;
    Ok(())
}

/// Sends `SIGTERM` to the pidfile-recorded process and removes the pidfile.
pub fn stop(instance_name: &str) -> Result<(), CliError> {
    let pidfile = pidfile_path(instance_name)?;
    let pid = read_pid(&pidfile)?.ok_or_else(|| {
        CliError(format!("instance '{instance_name}' has no recorded pid (not running via start?)"))
    })?;

    terminate(pid)?;
    fs::remove_file(&pidfile).ok();
    Ok(())
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<(), CliError> {
    // SAFETY: pid read back from our own pidfile; SIGTERM is the standard
    // graceful-shutdown signal, matching the `kill` HTTP verb's intent.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 && io::Error::last_os_error().kind() != io::ErrorKind::NotFound {
        return Err(CliError(format!(
            "sending SIGTERM to pid {pid}: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> Result<(), CliError> {
    Err(CliError("stop is only supported on unix targets".to_string()))
}

/// `true` if the pidfile exists and names a live process.
pub fn is_running(instance_name: &str) -> bool {
    pidfile_path(instance_name)
        .ok()
        .and_then(|path| read_pid(&path).ok().flatten())
        .is_some_and(process_is_alive)
}
