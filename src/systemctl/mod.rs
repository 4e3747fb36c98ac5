//! systemctl-compatible verb dispatch over SysV init scripts
//!
//! Every operand is resolved to an installed init script before anything
//! runs. Services are then handled one at a time in operand order; the
//! per-verb modules decide how their exit codes combine.

mod enable;
mod reload;
mod start_stop;
mod status;

use std::fmt;

use crate::layout::{Layout, LayoutError};
use crate::sysvinit::{InitScript, InvokeError, InvokeOptions, Outcome, ScriptVerb};
use crate::units::{NameError, ServiceName};

/// Version number reported by `--version`
pub const SYSTEMCTL_VERSION: u32 = 1812;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Enable,
    Disable,
    IsEnabled,
    IsActive,
    Status,
    Start,
    Stop,
    Restart,
    TryRestart,
    Reload,
    ReloadOrRestart,
    TryReloadOrRestart,
    Show,
    DaemonReload,
}

impl Verb {
    pub const ALL: [Verb; 14] = [
        Self::Enable,
        Self::Disable,
        Self::IsEnabled,
        Self::IsActive,
        Self::Status,
        Self::Start,
        Self::Stop,
        Self::Restart,
        Self::TryRestart,
        Self::Reload,
        Self::ReloadOrRestart,
        Self::TryReloadOrRestart,
        Self::Show,
        Self::DaemonReload,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            // systemd accepts both spellings
            "reload-or-try-restart" => Some(Self::TryReloadOrRestart),
            _ => Self::ALL.into_iter().find(|v| v.as_str() == s),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::IsEnabled => "is-enabled",
            Self::IsActive => "is-active",
            Self::Status => "status",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::TryRestart => "try-restart",
            Self::Reload => "reload",
            Self::ReloadOrRestart => "reload-or-restart",
            Self::TryReloadOrRestart => "try-reload-or-restart",
            Self::Show => "show",
            Self::DaemonReload => "daemon-reload",
        }
    }

    /// Whether at least one service operand is required
    pub fn needs_services(&self) -> bool {
        !matches!(self, Self::DaemonReload)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown command '{0}'")]
    UnknownVerb(String),

    #[error("{0} requires at least one service name")]
    NoServices(Verb),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("service '{0}' not found")]
    NotFound(String),

    #[error("environment error: {0}")]
    Layout(#[from] LayoutError),
}

impl DispatchError {
    /// Errors caused by how the command was called rather than system state
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::UnknownVerb(_) | Self::NoServices(_))
    }
}

/// Result of a dispatched verb
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    /// Output lines, in service order
    pub lines: Vec<String>,
    /// Per-service failures that produced no exit code
    pub errors: Vec<String>,
    pub code: i32,
}

impl Report {
    fn line(&mut self, quiet: bool, line: impl Into<String>) {
        if !quiet {
            self.lines.push(line.into());
        }
    }

    fn error(&mut self, verb: Verb, name: &ServiceName, err: &InvokeError) {
        log::warn!("{} {}: {}", verb, name, err);
        self.errors.push(format!("{}: {}: {}", verb, name, err));
    }
}

/// Aggregate exit code: the last non-zero code, or 0 if all succeeded
pub fn last_failure(codes: impl IntoIterator<Item = i32>) -> i32 {
    codes.into_iter().filter(|c| *c != 0).last().unwrap_or(0)
}

pub struct Dispatcher {
    layout: Layout,
    opts: InvokeOptions,
    quiet: bool,
}

impl Dispatcher {
    pub fn new(layout: Layout, opts: InvokeOptions) -> Self {
        Self {
            layout,
            opts,
            quiet: false,
        }
    }

    /// Suppress the per-service lines of status, is-enabled and is-active
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Resolve every operand up front so a typo has no side effects
    pub fn resolve(&self, names: &[String]) -> Result<Vec<InitScript>, DispatchError> {
        if !names.is_empty() {
            self.layout.require(&self.layout.init_dir())?;
        }
        names
            .iter()
            .map(|raw| {
                let name = ServiceName::parse(raw)?;
                InitScript::find(&self.layout, &name).map_err(|_| {
                    log::debug!("no init script for {} under {}", name, self.layout.root().display());
                    DispatchError::NotFound(raw.clone())
                })
            })
            .collect()
    }

    pub async fn run(&self, verb: Verb, names: &[String]) -> Result<Report, DispatchError> {
        if verb.needs_services() && names.is_empty() {
            return Err(DispatchError::NoServices(verb));
        }
        self.layout.require(self.layout.root())?;
        let scripts = self.resolve(names)?;
        log::debug!("{} on {} service(s)", verb, scripts.len());

        let report = match verb {
            Verb::Enable => self.enable(&scripts),
            Verb::Disable => self.disable(&scripts),
            Verb::IsEnabled => self.is_enabled(&scripts),
            Verb::IsActive => self.is_active(&scripts).await,
            Verb::Status => self.status(&scripts).await,
            Verb::Start => self.start(&scripts).await,
            Verb::Stop => self.stop(&scripts).await,
            Verb::Restart => self.restart(&scripts).await,
            Verb::TryRestart => self.try_restart(&scripts).await,
            Verb::Reload => self.reload(&scripts).await,
            Verb::ReloadOrRestart => self.reload_or_restart(&scripts).await,
            Verb::TryReloadOrRestart => self.try_reload_or_restart(&scripts).await,
            Verb::Show => self.show(&scripts).await,
            Verb::DaemonReload => {
                log::info!("daemon-reload: nothing to reload");
                Report::default()
            }
        };
        Ok(report)
    }

    async fn invoke(&self, script: &InitScript, verb: ScriptVerb) -> Result<Outcome, InvokeError> {
        script.invoke(verb, &self.opts).await
    }

    /// Run one script verb, turning a launch failure into code 1
    async fn code(&self, report: &mut Report, verb: Verb, script: &InitScript, sv: ScriptVerb) -> i32 {
        match self.invoke(script, sv).await {
            Ok(outcome) => outcome.code,
            Err(e) => {
                report.error(verb, script.name(), &e);
                1
            }
        }
    }
}
