//! Direct LSB runner
//!
//! Drives a service straight from its descriptor with the same exit code
//! contract as a generated init script, tracking the main process through
//! the pid file.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::time::Instant;

use crate::layout::{Layout, DEFAULT_PATH};
use crate::units::{ExecVerb, ServiceDescriptor, ServiceType};

/// LSB init script exit codes
pub mod lsb {
    pub const OK: i32 = 0;
    pub const DEAD_WITH_PIDFILE: i32 = 1;
    pub const GENERIC_ERROR: i32 = 1;
    pub const NOT_RUNNING: i32 = 3;
    pub const UNIMPLEMENTED: i32 = 3;
    pub const NOT_CONFIGURED: i32 = 6;
    pub const RELOAD_NOT_RUNNING: i32 = 7;
}

/// How long an `exec` service must survive to count as started
const EXEC_SETTLE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("{command} killed by signal {signal}")]
    Signaled { command: String, signal: i32 },

    #[error("waiting for {command} failed: {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },

    #[error("failed to write pid file {}: {source}", path.display())]
    PidFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Replace `$MAINPID` arguments with the main process id
fn substitute_mainpid(argv: &[String], pid: Option<i32>) -> Vec<String> {
    argv.iter()
        .map(|arg| match (arg.as_str(), pid) {
            ("$MAINPID" | "${MAINPID}", Some(pid)) => pid.to_string(),
            _ => arg.clone(),
        })
        .collect()
}

fn is_alive(pid: i32) -> bool {
    let pid = Pid::from_raw(pid);
    // A child of ours that already exited must be reaped before kill(0)
    // stops reporting it
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) | Err(_) => {}
        Ok(status) => {
            log::debug!("reaped {} ({:?})", pid, status);
            return false;
        }
    }
    kill(pid, None).is_ok() && !is_zombie(pid)
}

/// Zombies not parented by us still answer kill(0)
fn is_zombie(pid: Pid) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            // The command name may contain spaces, the state follows its ')'
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

fn before(deadline: Option<Instant>) -> bool {
    deadline.map_or(true, |d| Instant::now() < d)
}

pub struct Runner<'a> {
    svc: &'a ServiceDescriptor,
    root: PathBuf,
    path: String,
    pid_file: PathBuf,
    timeout: Duration,
}

impl<'a> Runner<'a> {
    pub fn new(svc: &'a ServiceDescriptor, layout: &Layout, timeout: Duration) -> Self {
        let pid_file = svc
            .pid_file()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| layout.default_pid_file(svc.name()));
        Self {
            svc,
            root: layout.root().to_path_buf(),
            path: std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string()),
            pid_file,
            timeout,
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Deadline for a wait loop, `None` if the timeout is too large to reach
    fn deadline(&self) -> Option<Instant> {
        Instant::now().checked_add(self.timeout)
    }

    fn main_pid(&self) -> Option<i32> {
        std::fs::read_to_string(&self.pid_file)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|pid| *pid > 0)
    }

    fn command(&self, argv: &[String], main_pid: Option<i32>) -> Option<Command> {
        let argv = substitute_mainpid(argv, main_pid);
        let (program, args) = argv.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .env("ROOT", &self.root)
            .env("PWD", &self.root)
            .env("PATH", &self.path)
            .envs(self.svc.environment().iter())
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(pid) = main_pid {
            cmd.env("MAINPID", pid.to_string());
        }
        Some(cmd)
    }

    /// Run a command to completion within the timeout
    async fn run(&self, verb: ExecVerb, main_pid: Option<i32>) -> Result<Option<i32>, RunError> {
        let Some(argv) = self.svc.exec(verb) else {
            return Ok(None);
        };
        let Some(mut cmd) = self.command(argv, main_pid) else {
            return Ok(None);
        };
        let command = argv.join(" ");
        log::info!("{}: {} {}", self.svc.name(), verb.key(), command);

        let child = cmd
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                command: command.clone(),
                source,
            })?;
        let status = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output.status,
            Ok(Err(source)) => return Err(RunError::Wait { command, source }),
            Err(_) => {
                return Err(RunError::Timeout {
                    command,
                    timeout: self.timeout,
                })
            }
        };

        match (status.code(), status.signal()) {
            (Some(code), _) => Ok(Some(code)),
            (None, signal) => Err(RunError::Signaled {
                command,
                signal: signal.unwrap_or(0),
            }),
        }
    }

    /// 0 running, 1 dead with a pid file, 3 not running
    pub fn status(&self) -> i32 {
        if !self.pid_file.exists() {
            return lsb::NOT_RUNNING;
        }
        match self.main_pid() {
            Some(pid) if is_alive(pid) => lsb::OK,
            _ => lsb::DEAD_WITH_PIDFILE,
        }
    }

    pub async fn start(&self) -> Result<i32, RunError> {
        if self.status() == lsb::OK {
            log::info!("{} is already running", self.svc.name());
            return Ok(lsb::OK);
        }
        let Some(argv) = self.svc.exec(ExecVerb::Start) else {
            log::warn!("{} has no ExecStart", self.svc.name());
            return Ok(lsb::NOT_CONFIGURED);
        };

        match self.svc.service_type() {
            ServiceType::Forking => {
                let code = self.run(ExecVerb::Start, None).await?.unwrap_or(lsb::OK);
                if code != 0 {
                    return Ok(lsb::GENERIC_ERROR);
                }
                let deadline = self.deadline();
                while self.main_pid().is_none() && before(deadline) {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Ok(self.status())
            }
            ServiceType::Simple | ServiceType::Exec => {
                let Some(mut cmd) = self.command(argv, None) else {
                    return Ok(lsb::NOT_CONFIGURED);
                };
                let child = cmd.spawn().map_err(|source| RunError::Spawn {
                    command: argv.join(" "),
                    source,
                })?;
                let Some(pid) = child.id() else {
                    return Ok(lsb::GENERIC_ERROR);
                };
                // Left running once the handle drops
                drop(child);
                std::fs::write(&self.pid_file, format!("{}\n", pid)).map_err(|source| {
                    RunError::PidFile {
                        path: self.pid_file.clone(),
                        source,
                    }
                })?;
                log::info!("{} started with pid {}", self.svc.name(), pid);

                if self.svc.service_type() == ServiceType::Exec {
                    tokio::time::sleep(EXEC_SETTLE).await;
                    if !is_alive(pid as i32) {
                        log::warn!("{} exited right after starting", self.svc.name());
                        let _ = std::fs::remove_file(&self.pid_file);
                        return Ok(lsb::GENERIC_ERROR);
                    }
                }
                Ok(lsb::OK)
            }
        }
    }

    pub async fn stop(&self) -> Result<i32, RunError> {
        let pid = match self.main_pid() {
            Some(pid) if is_alive(pid) => pid,
            _ => {
                let _ = std::fs::remove_file(&self.pid_file);
                return Ok(lsb::OK);
            }
        };

        if let Some(code) = self.run(ExecVerb::Stop, Some(pid)).await? {
            log::debug!("{}: ExecStop returned {}", self.svc.name(), code);
        }

        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        let deadline = self.deadline();
        while is_alive(pid) && before(deadline) {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        if is_alive(pid) {
            log::warn!("{} ignored SIGTERM, sending SIGKILL", self.svc.name());
            let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
            for _ in 0..10 {
                if !is_alive(pid) {
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }

        let _ = std::fs::remove_file(&self.pid_file);
        Ok(if is_alive(pid) { lsb::GENERIC_ERROR } else { lsb::OK })
    }

    pub async fn reload(&self) -> Result<i32, RunError> {
        if self.svc.exec(ExecVerb::Reload).is_none() {
            return Ok(lsb::UNIMPLEMENTED);
        }
        if self.status() != lsb::OK {
            return Ok(lsb::RELOAD_NOT_RUNNING);
        }
        match self.run(ExecVerb::Reload, self.main_pid()).await? {
            Some(0) | None => Ok(lsb::OK),
            Some(_) => Ok(lsb::GENERIC_ERROR),
        }
    }

    pub async fn restart(&self) -> Result<i32, RunError> {
        match self.stop().await? {
            lsb::OK => self.start().await,
            code => Ok(code),
        }
    }
}
