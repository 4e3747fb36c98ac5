//! Running init scripts
//!
//! Each invocation is a single child process with a scrubbed environment,
//! bounded by a timeout. Failing to get an exit code at all is reported as
//! [`InvokeError`], never folded into the script's own status.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::layout::{Layout, LayoutError, DEFAULT_PATH};
use crate::units::ServiceName;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// LSB verbs understood by generated scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptVerb {
    Start,
    Stop,
    Restart,
    TryRestart,
    Reload,
    ForceReload,
    Status,
    Show,
}

impl ScriptVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::TryRestart => "try-restart",
            Self::Reload => "reload",
            Self::ForceReload => "force-reload",
            Self::Status => "status",
            Self::Show => "show",
        }
    }
}

impl fmt::Display for ScriptVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("could not launch {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} {verb} timed out after {timeout:?}", path.display())]
    Timeout {
        path: PathBuf,
        verb: ScriptVerb,
        timeout: Duration,
    },

    #[error("{} {verb} killed by signal {signal}", path.display())]
    Signaled {
        path: PathBuf,
        verb: ScriptVerb,
        signal: i32,
    },

    #[error("waiting for {} failed: {source}", path.display())]
    Wait {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What to do with the script's standard output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Discard,
    Capture,
    Inherit,
}

#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub root: PathBuf,
    pub path: String,
    pub timeout: Duration,
    pub output: OutputMode,
    /// Pass the script's stderr through instead of discarding it
    pub stderr: bool,
}

impl InvokeOptions {
    pub fn new(layout: &Layout) -> Self {
        Self {
            root: layout.root().to_path_buf(),
            path: std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string()),
            timeout: DEFAULT_TIMEOUT,
            output: OutputMode::Discard,
            stderr: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn stderr(mut self, inherit: bool) -> Self {
        self.stderr = inherit;
        self
    }
}

/// Exit code of a completed script run, plus captured stdout if requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub code: i32,
    pub stdout: String,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// An installed init script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitScript {
    name: ServiceName,
    path: PathBuf,
}

impl InitScript {
    pub fn new(name: ServiceName, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
        }
    }

    /// The script for `name` under `etc/init.d`, which must exist
    ///
    /// A missing `etc/init.d` is reported as such, not as a missing script.
    pub fn find(layout: &Layout, name: &ServiceName) -> Result<Self, LayoutError> {
        layout.require(&layout.init_dir())?;
        let path = layout.init_script(name);
        layout.require(&path)?;
        Ok(Self::new(name.clone(), path))
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `<script> <verb>` and return its exit code
    pub async fn invoke(
        &self,
        verb: ScriptVerb,
        opts: &InvokeOptions,
    ) -> Result<Outcome, InvokeError> {
        log::info!("running {} {}", self.path.display(), verb);

        let stdout = match opts.output {
            OutputMode::Discard => Stdio::null(),
            OutputMode::Capture => Stdio::piped(),
            OutputMode::Inherit => Stdio::inherit(),
        };
        let stderr = if opts.stderr {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let mut cmd = Command::new(&self.path);
        cmd.arg(verb.as_str())
            .env_clear()
            .env("ROOT", &opts.root)
            .env("PWD", &opts.root)
            .env("PATH", &opts.path)
            .current_dir(&opts.root)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| InvokeError::Spawn {
            path: self.path.clone(),
            source,
        })?;

        // Dropping the child on timeout kills it
        let output = match tokio::time::timeout(opts.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(InvokeError::Wait {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(_) => {
                log::warn!("{} {} timed out after {:?}", self.path.display(), verb, opts.timeout);
                return Err(InvokeError::Timeout {
                    path: self.path.clone(),
                    verb,
                    timeout: opts.timeout,
                });
            }
        };

        let code = match (output.status.code(), output.status.signal()) {
            (Some(code), _) => code,
            (None, Some(signal)) => {
                return Err(InvokeError::Signaled {
                    path: self.path.clone(),
                    verb,
                    signal,
                })
            }
            (None, None) => {
                return Err(InvokeError::Wait {
                    path: self.path.clone(),
                    source: std::io::Error::other("no exit status"),
                })
            }
        };

        log::debug!("{} {} exited with {}", self.name, verb, code);
        Ok(Outcome {
            code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn script(body: &str) -> (tempfile::TempDir, Layout, InitScript) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fs::create_dir_all(layout.init_dir()).unwrap();
        let name = ServiceName::parse("foo").unwrap();
        let path = layout.init_script(&name);
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        let script = InitScript::find(&layout, &name).unwrap();
        (dir, layout, script)
    }

    #[tokio::test]
    async fn test_exit_code_passes_through() {
        let (_dir, layout, script) = script("case \"$1\" in status) exit 3;; *) exit 0;; esac\n");
        let opts = InvokeOptions::new(&layout);
        assert_eq!(script.invoke(ScriptVerb::Status, &opts).await.unwrap().code, 3);
        assert_eq!(script.invoke(ScriptVerb::Start, &opts).await.unwrap().code, 0);
    }

    #[tokio::test]
    async fn test_environment_is_scrubbed() {
        let (dir, layout, script) = script("echo \"$1|$ROOT|$PWD|${HOME:-none}\"\n");
        let opts = InvokeOptions::new(&layout).output(OutputMode::Capture);
        let out = script.invoke(ScriptVerb::Show, &opts).await.unwrap();
        let root = dir.path().display().to_string();
        assert_eq!(out.stdout, format!("show|{}|{}|none\n", root, root));
    }

    #[tokio::test]
    async fn test_discarded_output_is_empty() {
        let (_dir, layout, script) = script("echo noise\n");
        let out = script
            .invoke(ScriptVerb::Status, &InvokeOptions::new(&layout))
            .await
            .unwrap();
        assert_eq!(out.stdout, "");
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_error() {
        let (_dir, layout, script) = script("sleep 5\n");
        let opts = InvokeOptions::new(&layout).timeout(Duration::from_millis(200));
        let err = script.invoke(ScriptVerb::Start, &opts).await.unwrap_err();
        assert!(matches!(err, InvokeError::Timeout { verb: ScriptVerb::Start, .. }));
    }

    #[tokio::test]
    async fn test_signal_is_distinct_error() {
        let (_dir, layout, script) = script("kill -KILL $$\n");
        let err = script
            .invoke(ScriptVerb::Stop, &InvokeOptions::new(&layout))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Signaled { signal: 9, .. }));
    }

    #[tokio::test]
    async fn test_unlaunchable_script() {
        let (_dir, layout, script) = script("exit 0\n");
        fs::set_permissions(script.path(), fs::Permissions::from_mode(0o644)).unwrap();
        let err = script
            .invoke(ScriptVerb::Start, &InvokeOptions::new(&layout))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }));
    }

    #[test]
    fn test_find_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let name = ServiceName::parse("foo").unwrap();
        match InitScript::find(&layout, &name) {
            Err(LayoutError::MissingComponent(path)) => assert_eq!(path, layout.init_dir()),
            other => panic!("unexpected {:?}", other),
        }

        fs::create_dir_all(layout.init_dir()).unwrap();
        match InitScript::find(&layout, &name) {
            Err(LayoutError::MissingComponent(path)) => {
                assert_eq!(path, layout.init_script(&name))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
