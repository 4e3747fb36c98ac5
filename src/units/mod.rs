//! Unit file parsing and the service descriptor
//!
//! Parses systemd .service files into a [`ServiceDescriptor`], validating
//! every directive the init script generator relies on.

mod name;
mod parser;
mod service;

pub use name::{NameError, ServiceName, DOT_SERVICE};
pub use parser::{parse_environment, parse_file, split_command, ParseError, ParsedFile};
pub use service::*;

use std::path::{Path, PathBuf};

use crate::layout::Layout;

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("command '{command}' not found under {}", root.display())]
    MissingExecutable { command: String, root: PathBuf },

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Directives the descriptor understands, per section
const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("[Unit]", &["DESCRIPTION"]),
    (
        "[Service]",
        &["TYPE", "EXECSTART", "EXECSTOP", "EXECRELOAD", "PIDFILE", "ENVIRONMENT"],
    ),
    ("[Install]", &["WANTEDBY"]),
];

fn exec_key(verb: ExecVerb) -> &'static str {
    match verb {
        ExecVerb::Start => "EXECSTART",
        ExecVerb::Stop => "EXECSTOP",
        ExecVerb::Reload => "EXECRELOAD",
    }
}

/// Convert parsed INI data into a validated descriptor
pub fn parse_service(
    name: &ServiceName,
    parsed: &ParsedFile,
    layout: &Layout,
) -> Result<ServiceDescriptor, UnitError> {
    let mut svc = ServiceDescriptor::new(name.clone());

    for (section, entries) in parsed {
        let known = KNOWN_KEYS
            .iter()
            .find(|(s, _)| s == section)
            .map(|(_, keys)| *keys)
            .unwrap_or(&[]);
        for key in entries.keys() {
            if !known.contains(&key.as_str()) {
                log::debug!("{}: ignoring {} {}", name, section, key);
            }
        }
    }

    // [Unit] section
    if let Some(unit) = parsed.get("[Unit]") {
        if let Some(desc) = parser::last_value(unit, "DESCRIPTION") {
            svc.set_description(desc)?;
        }
    }

    // [Service] section
    if let Some(service) = parsed.get("[Service]") {
        if let Some(t) = parser::last_value(service, "TYPE") {
            svc.set_type(t)?;
        }

        for verb in ExecVerb::ALL {
            let lines = parser::all_values(service, exec_key(verb));
            if lines.len() > 1 {
                return Err(UnitError::Validation {
                    field: verb.key(),
                    reason: "only one command line is supported".to_string(),
                });
            }
            if let Some(line) = lines.first() {
                let argv = split_command(line)?;
                svc.set_exec(verb, argv, layout)?;
            }
        }

        if let Some(pid_file) = parser::last_value(service, "PIDFILE") {
            svc.set_pid_file(PidFileSpec::Path(PathBuf::from(pid_file)), layout);
        }

        for line in parser::all_values(service, "ENVIRONMENT") {
            for (key, value) in parse_environment(line)? {
                svc.setenv(&key, value)?;
            }
        }
    }

    // [Install] section: always rendered as multi-user.target
    if let Some(install) = parsed.get("[Install]") {
        for target in parser::all_values(install, "WANTEDBY") {
            if target != "multi-user.target" {
                log::debug!("{}: WantedBy={} treated as multi-user.target", name, target);
            }
        }
    }

    Ok(svc)
}

/// Parse unit text into a descriptor
pub fn parse_unit(
    name: &ServiceName,
    content: &str,
    layout: &Layout,
) -> Result<ServiceDescriptor, UnitError> {
    let parsed = parse_file(content)?;
    parse_service(name, &parsed, layout)
}

/// Read and parse a unit file from disk
pub async fn load_service(
    name: &ServiceName,
    path: &Path,
    layout: &Layout,
) -> Result<ServiceDescriptor, UnitError> {
    log::info!("loading '{}' service from {}", name, path.display());
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| UnitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_unit(name, &content, layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_with(binaries: &[&str]) -> (tempfile::TempDir, Layout) {
        let dir = tempfile::tempdir().unwrap();
        for bin in binaries {
            let path = dir.path().join(bin.trim_start_matches('/'));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "").unwrap();
        }
        let layout = Layout::new(dir.path());
        (dir, layout)
    }

    fn foo() -> ServiceName {
        ServiceName::parse("foo").unwrap()
    }

    #[test]
    fn test_parse_full_unit() {
        let (_dir, layout) = root_with(&["/usr/sbin/mockd", "/bin/kill"]);
        let content = r#"
[Unit]
Description=Mock daemon

[Service]
Type=forking
ExecStart=/usr/sbin/mockd syslog 'two words'
ExecReload=/bin/kill -HUP $MAINPID
PIDFile=/run/mockd.pid
Environment=FOO=bar "BAZ=qu ux"
Environment=EMPTY=

[Install]
WantedBy=multi-user.target
"#;
        let svc = parse_unit(&foo(), content, &layout).unwrap();
        assert_eq!(svc.description(), "Mock daemon");
        assert_eq!(svc.service_type(), ServiceType::Forking);
        assert_eq!(
            svc.exec(ExecVerb::Start).unwrap(),
            &["/usr/sbin/mockd", "syslog", "two words"]
        );
        assert!(svc.exec(ExecVerb::Stop).is_none());
        assert_eq!(
            svc.exec(ExecVerb::Reload).unwrap(),
            &["/bin/kill", "-HUP", "$MAINPID"]
        );
        assert_eq!(svc.pid_file(), Some(Path::new("/run/mockd.pid")));
        assert_eq!(svc.getenv("FOO"), Some("bar"));
        assert_eq!(svc.getenv("BAZ"), Some("qu ux"));
        assert_eq!(svc.getenv("EMPTY"), Some(""));
    }

    #[test]
    fn test_minimal_unit_uses_defaults() {
        let (_dir, layout) = root_with(&[]);
        let svc = parse_unit(&foo(), "[Unit]\n", &layout).unwrap();
        assert_eq!(svc.description(), "foo service");
        assert_eq!(svc.service_type(), ServiceType::Simple);
    }

    #[test]
    fn test_bare_pid_file_goes_to_runtime_dir() {
        let (_dir, layout) = root_with(&[]);
        let svc = parse_unit(&foo(), "[Service]\nPIDFile=foo.pid\n", &layout).unwrap();
        assert_eq!(svc.pid_file(), Some(layout.runtime_dir().join("foo.pid").as_path()));
    }

    #[test]
    fn test_invalid_type_is_validation_error() {
        let (_dir, layout) = root_with(&[]);
        let err = parse_unit(&foo(), "[Service]\nType=notify\n", &layout).unwrap_err();
        assert!(matches!(err, UnitError::Validation { field: "Type", .. }));
    }

    #[test]
    fn test_missing_executable_is_path_error() {
        let (_dir, layout) = root_with(&[]);
        let err = parse_unit(&foo(), "[Service]\nExecStart=/usr/sbin/mockd\n", &layout)
            .unwrap_err();
        assert!(matches!(err, UnitError::MissingExecutable { .. }));
    }

    #[test]
    fn test_bad_environment_key() {
        let (_dir, layout) = root_with(&[]);
        let err = parse_unit(&foo(), "[Service]\nEnvironment=1X=y\n", &layout).unwrap_err();
        assert!(matches!(err, UnitError::Validation { field: "Environment", .. }));
    }

    #[test]
    fn test_malformed_syntax_is_parse_error() {
        let (_dir, layout) = root_with(&[]);
        let err = parse_unit(&foo(), "[Service\nType=simple\n", &layout).unwrap_err();
        assert!(matches!(err, UnitError::Parse(_)));
    }

    #[test]
    fn test_multiple_exec_lines_rejected() {
        let (_dir, layout) = root_with(&["/bin/true"]);
        let content = "[Service]\nExecStart=/bin/true\nExecStart=/bin/true again\n";
        let err = parse_unit(&foo(), content, &layout).unwrap_err();
        assert!(matches!(err, UnitError::Validation { field: "ExecStart", .. }));
    }

    #[test]
    fn test_unknown_directives_are_ignored() {
        let (_dir, layout) = root_with(&[]);
        let content = "[Unit]\nAfter=network.target\n[Service]\nRestart=always\n[X-Custom]\nKey=1\n";
        assert!(parse_unit(&foo(), content, &layout).is_ok());
    }

    #[tokio::test]
    async fn test_load_service_missing_file() {
        let (_dir, layout) = root_with(&[]);
        let path = layout.unit_dir().join("foo.service");
        let err = load_service(&foo(), &path, &layout).await.unwrap_err();
        assert!(matches!(err, UnitError::Io { .. }));
    }
}
