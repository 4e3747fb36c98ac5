//! Typed service descriptor
//!
//! Only the directives that survive translation to a SysV init script are
//! modelled: Description, Type, ExecStart/ExecStop/ExecReload, PIDFile,
//! Environment and the fixed WantedBy.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{ServiceName, UnitError};
use crate::layout::Layout;

/// Service type determines how the init script launches ExecStart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    Simple,  // Backgrounded by the script, PID recorded
    Exec,    // Like simple, but an immediate exit is reported
    Forking, // Daemonizes itself, PIDFile= tells us the PID
}

impl ServiceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(Self::Simple),
            "exec" => Some(Self::Exec),
            "forking" => Some(Self::Forking),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Exec => "exec",
            Self::Forking => "forking",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which Exec*= line a command belongs to
///
/// The derived ordering is the serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecVerb {
    Start,
    Stop,
    Reload,
}

impl ExecVerb {
    pub const ALL: [ExecVerb; 3] = [Self::Start, Self::Stop, Self::Reload];

    /// Unit file key, e.g. `ExecStart`
    pub fn key(&self) -> &'static str {
        match self {
            Self::Start => "ExecStart",
            Self::Stop => "ExecStop",
            Self::Reload => "ExecReload",
        }
    }
}

/// Ordered string-to-string environment with identifier keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: Vec<(String, String)>,
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing an earlier value in place
    pub fn set(&mut self, key: &str, value: impl ToString) -> Result<(), UnitError> {
        if !is_identifier(key) {
            return Err(UnitError::Validation {
                field: "Environment",
                reason: format!("'{}' is not a valid variable name", key),
            });
        }
        let value = value.to_string();
        if value.contains('\n') || value.contains('\0') {
            return Err(UnitError::Validation {
                field: "Environment",
                reason: format!("value of '{}' may not contain NUL or newline", key),
            });
        }
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.vars.push((key.to_string(), value)),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}

/// How a PIDFile= value was given
#[derive(Debug, Clone, PartialEq)]
pub enum PidFileSpec {
    /// `<name>.pid` in the runtime directory
    Default,
    /// A file name (runtime directory) or a path (used as-is)
    Path(PathBuf),
}

impl PidFileSpec {
    fn resolve(&self, name: &ServiceName, layout: &Layout) -> PathBuf {
        match self {
            Self::Default => layout.default_pid_file(name),
            Self::Path(path) if path.components().count() > 1 || path.is_absolute() => path.clone(),
            Self::Path(file) => layout.runtime_dir().join(file),
        }
    }
}

/// A service unit reduced to what the init script generator needs
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    name: ServiceName,
    description: Option<String>,
    service_type: Option<ServiceType>,
    exec: BTreeMap<ExecVerb, Vec<String>>,
    pid_file: Option<PathBuf>,
    environment: Environment,
}

/// Description used when the unit has none
pub fn default_description(name: &ServiceName) -> String {
    format!("{} service", name)
}

impl ServiceDescriptor {
    pub fn new(name: ServiceName) -> Self {
        Self {
            name,
            description: None,
            service_type: None,
            exec: BTreeMap::new(),
            pid_file: None,
            environment: Environment::new(),
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| default_description(&self.name))
    }

    pub fn set_description(&mut self, description: impl ToString) -> Result<(), UnitError> {
        let description = description.to_string();
        if description.contains('\n') || description.contains('\0') {
            return Err(UnitError::Validation {
                field: "Description",
                reason: "may not contain NUL or newline".to_string(),
            });
        }
        self.description = Some(description);
        Ok(())
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type.unwrap_or_default()
    }

    pub fn set_type(&mut self, value: &str) -> Result<(), UnitError> {
        let parsed = ServiceType::parse(value).ok_or_else(|| UnitError::Validation {
            field: "Type",
            reason: format!("'{}' is not one of simple, exec, forking", value),
        })?;
        self.service_type = Some(parsed);
        Ok(())
    }

    /// Set an Exec*= command; its executable must exist under the root
    pub fn set_exec(
        &mut self,
        verb: ExecVerb,
        argv: Vec<String>,
        layout: &Layout,
    ) -> Result<(), UnitError> {
        let Some(program) = argv.first() else {
            return Err(UnitError::Validation {
                field: verb.key(),
                reason: "command line is empty".to_string(),
            });
        };
        if argv.iter().any(|arg| arg.contains('\0') || arg.contains('\n')) {
            return Err(UnitError::Validation {
                field: verb.key(),
                reason: "arguments may not contain NUL or newline".to_string(),
            });
        }
        if layout.find_executable(program).is_none() {
            return Err(UnitError::MissingExecutable {
                command: program.clone(),
                root: layout.root().to_path_buf(),
            });
        }
        self.exec.insert(verb, argv);
        Ok(())
    }

    pub fn exec(&self, verb: ExecVerb) -> Option<&[String]> {
        self.exec.get(&verb).map(Vec::as_slice)
    }

    pub fn set_pid_file(&mut self, spec: PidFileSpec, layout: &Layout) {
        self.pid_file = Some(spec.resolve(&self.name, layout));
    }

    pub fn pid_file(&self) -> Option<&Path> {
        self.pid_file.as_deref()
    }

    pub fn setenv(&mut self, key: &str, value: impl ToString) -> Result<(), UnitError> {
        self.environment.set(key, value)
    }

    pub fn getenv(&self, key: &str) -> Option<&str> {
        self.environment.get(key)
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }
}

/// Parse duration from systemd format (e.g., "5s", "100ms", "1min")
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(n) = s.strip_suffix("ms") {
        n.parse().ok().map(Duration::from_millis)
    } else if let Some(n) = s.strip_suffix("min") {
        n.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('s') {
        n.parse().ok().map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('h') {
        n.parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        // Bare number = seconds
        s.parse().ok().map(Duration::from_secs)
    }
}
