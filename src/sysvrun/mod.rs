//! Unit conversion and inspection
//!
//! `sysvrun <service> <action>` loads a unit (from a unit file or from the
//! copy embedded in an installed init script) and converts it, shows it, or
//! runs it directly.

mod runner;

pub use runner::{lsb, RunError, Runner};

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::layout::{Layout, LayoutError};
use crate::sysvinit::{self, script, ScriptError};
use crate::units::{self, NameError, ServiceDescriptor, ServiceName, UnitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Convert,
    Show,
    Start,
    Stop,
    Reload,
    Restart,
    Status,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "convert" => Self::Convert,
            "show" => Self::Show,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "reload" => Self::Reload,
            "restart" => Self::Restart,
            "status" => Self::Status,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Show => "show",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reload => "reload",
            Self::Restart => "restart",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SysvrunError {
    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("environment error: {0}")]
    Layout(#[from] LayoutError),

    #[error("no unit file or init script found for '{0}'")]
    NotFound(ServiceName),

    #[error("{} has no embedded unit", .0.display())]
    NoEmbeddedUnit(PathBuf),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Where convert/show send their result
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    /// convert installs into etc/init.d, show prints
    #[default]
    Default,
    Stdout,
    File(PathBuf),
}

impl Destination {
    /// `-` means standard output
    pub fn from_arg(arg: Option<&Path>) -> Self {
        match arg {
            None => Self::Default,
            Some(p) if p == Path::new("-") => Self::Stdout,
            Some(p) => Self::File(p.to_path_buf()),
        }
    }
}

pub struct Sysvrun {
    layout: Layout,
    unit_file: Option<PathBuf>,
    destination: Destination,
    timeout: Duration,
}

impl Sysvrun {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            unit_file: None,
            destination: Destination::Default,
            timeout: sysvinit::invoke::DEFAULT_TIMEOUT,
        }
    }

    pub fn unit_file(mut self, path: Option<PathBuf>) -> Self {
        self.unit_file = path;
        self
    }

    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load the descriptor for `name`
    ///
    /// Without an explicit unit file, the unit search path is tried first,
    /// then the unit embedded in `etc/init.d/<name>`.
    pub async fn load(&self, name: &ServiceName) -> Result<ServiceDescriptor, SysvrunError> {
        self.layout.require(self.layout.root())?;

        let path = match &self.unit_file {
            Some(path) => {
                self.layout.require(path)?;
                path.clone()
            }
            None => match self.layout.find_unit_file(name) {
                Some(path) => path,
                None => {
                    let script = self.layout.init_script(name);
                    if !script.is_file() {
                        return Err(SysvrunError::NotFound(name.clone()));
                    }
                    script
                }
            },
        };

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| UnitError::Io {
                path: path.clone(),
                source,
            })?;
        if script::is_script(&text) {
            log::info!("loading '{}' from init script {}", name, path.display());
            let unit = script::extract_embedded(&text)
                .ok_or_else(|| SysvrunError::NoEmbeddedUnit(path.clone()))?;
            return Ok(units::parse_unit(name, unit, &self.layout)?);
        }
        log::info!("loading '{}' from {}", name, path.display());
        Ok(units::parse_unit(name, &text, &self.layout)?)
    }

    /// Run `action` for the service, writing any printed output to `out`
    pub async fn run(
        &self,
        name: &str,
        action: Action,
        out: &mut impl Write,
    ) -> Result<i32, SysvrunError> {
        let name = ServiceName::parse(name)?;
        let svc = self.load(&name).await?;

        match action {
            Action::Convert => self.convert(&svc, out).map(|()| 0),
            Action::Show => self.show(&svc, out).map(|()| 0),
            _ => {
                let runner = Runner::new(&svc, &self.layout, self.timeout);
                let code = match action {
                    Action::Start => runner.start().await?,
                    Action::Stop => runner.stop().await?,
                    Action::Reload => runner.reload().await?,
                    Action::Restart => runner.restart().await?,
                    Action::Status => {
                        let code = runner.status();
                        let state = match code {
                            lsb::OK => "running",
                            lsb::NOT_RUNNING => "not running",
                            _ => "dead but pid file exists",
                        };
                        writeln!(out, "{} is {}", name, state)?;
                        code
                    }
                    Action::Convert | Action::Show => 0,
                };
                Ok(code)
            }
        }
    }

    fn convert(&self, svc: &ServiceDescriptor, out: &mut impl Write) -> Result<(), SysvrunError> {
        match &self.destination {
            Destination::Stdout => {
                let pid_file = svc
                    .pid_file()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.layout.default_pid_file(svc.name()));
                out.write_all(sysvinit::render_script(svc, &pid_file)?.as_bytes())?;
            }
            Destination::File(path) => {
                sysvinit::convert(svc, &self.layout, path)?;
            }
            Destination::Default => {
                self.layout.require(&self.layout.init_dir())?;
                let path = self.layout.init_script(svc.name());
                sysvinit::convert(svc, &self.layout, &path)?;
            }
        }
        Ok(())
    }

    fn show(&self, svc: &ServiceDescriptor, out: &mut impl Write) -> Result<(), SysvrunError> {
        match &self.destination {
            Destination::File(path) => sysvinit::show_to_file(svc, path)?,
            Destination::Default | Destination::Stdout => {
                out.write_all(sysvinit::render_unit(svc)?.as_bytes())?
            }
        }
        Ok(())
    }
}
