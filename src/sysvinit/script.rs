//! Init script generator
//!
//! Renders a [`ServiceDescriptor`] either back into canonical unit text
//! (`show`) or into a self-contained LSB init script (`convert`). The script
//! carries the unit text verbatim between [`BEGIN_EMBED`] and [`END_EMBED`].

use std::borrow::Cow;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write as _};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use nix::sys::stat::Mode;

use crate::units::{ExecVerb, ServiceDescriptor, ServiceType};

pub const LSB_BEGIN_INIT_INFO: &str = "### BEGIN INIT INFO";
pub const LSB_END_INIT_INFO: &str = "### END INIT INFO";
pub const BEGIN_EMBED: &str = ":<<SYSVKIT";
pub const END_EMBED: &str = "SYSVKIT";

/// Requested mode of a generated init script, before the umask
pub const SCRIPT_MODE: u32 = 0o755;
/// Requested mode of `show` output written to a file, before the umask
pub const UNIT_MODE: u32 = 0o644;

/// Seconds the script waits for a stopping service before SIGKILL
const STOP_WAIT_SECS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("cannot quote {field} argument {arg:?}")]
    Quote { field: &'static str, arg: String },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Canonical unit text, as embedded in generated scripts
pub fn render_unit(svc: &ServiceDescriptor) -> Result<String, ScriptError> {
    let mut out = String::new();
    out.push_str("[Unit]\n");
    let _ = writeln!(out, "Description={}", svc.description());

    out.push_str("[Service]\n");
    let _ = writeln!(out, "Type={}", svc.service_type());
    for verb in ExecVerb::ALL {
        if let Some(argv) = svc.exec(verb) {
            let _ = writeln!(out, "{}={}", verb.key(), quote_argv(verb.key(), argv)?);
        }
    }
    if let Some(pid_file) = svc.pid_file() {
        let _ = writeln!(out, "PIDFile={}", pid_file.display());
    }
    for (key, value) in svc.environment().iter() {
        let _ = writeln!(out, "Environment={}={}", key, quote("Environment", value)?);
    }

    out.push_str("[Install]\n");
    out.push_str("WantedBy=multi-user.target\n");
    Ok(out)
}

fn quote<'a>(field: &'static str, arg: &'a str) -> Result<Cow<'a, str>, ScriptError> {
    shlex::try_quote(arg).map_err(|_| ScriptError::Quote {
        field,
        arg: arg.to_string(),
    })
}

fn quote_argv(field: &'static str, argv: &[String]) -> Result<String, ScriptError> {
    let words = argv
        .iter()
        .map(|arg| quote(field, arg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(words.join(" "))
}

/// Quote argv for the shell body of the script
///
/// `$MAINPID` is the one variable systemd substitutes that we can honour, so
/// it is left expandable.
fn shell_argv(field: &'static str, argv: &[String]) -> Result<String, ScriptError> {
    let words = argv
        .iter()
        .map(|arg| match arg.as_str() {
            "$MAINPID" | "${MAINPID}" => Ok(Cow::Borrowed("\"$MAINPID\"")),
            _ => quote(field, arg),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(words.join(" "))
}

/// Shell command line for an Exec*= entry
///
/// The unit environment is passed through `env`, so it reaches the service
/// and never the script's own variables or PATH.
fn exec_line(svc: &ServiceDescriptor, verb: ExecVerb) -> Result<Option<String>, ScriptError> {
    let Some(argv) = svc.exec(verb) else {
        return Ok(None);
    };
    let cmd = shell_argv(verb.key(), argv)?;
    if svc.environment().is_empty() {
        return Ok(Some(cmd));
    }
    let mut line = String::from("env");
    for (key, value) in svc.environment().iter() {
        let assignment = format!("{}={}", key, value);
        line.push(' ');
        line.push_str(&quote("Environment", &assignment)?);
    }
    line.push(' ');
    line.push_str(&cmd);
    Ok(Some(line))
}

/// Full text of the init script for a service
pub fn render_script(svc: &ServiceDescriptor, pid_file: &Path) -> Result<String, ScriptError> {
    let unit = render_unit(svc)?;
    let name = svc.name().as_str();
    let mut out = String::new();

    out.push_str("#!/bin/sh\n\n");
    let _ = writeln!(out, "{}", LSB_BEGIN_INIT_INFO);
    let _ = writeln!(out, "# {:<22}{}", "Provides:", name);
    let _ = writeln!(out, "# {:<22}{}", "Default-Start:", "2 3 4 5");
    let _ = writeln!(out, "# {:<22}{}", "Default-Stop:", "0 1 6");
    let _ = writeln!(out, "# {:<22}{}", "Short-Description:", svc.description());
    let _ = writeln!(out, "{}\n", LSB_END_INIT_INFO);

    let _ = writeln!(out, "NAME={}", quote("name", name)?);
    let pid_file = pid_file.display().to_string();
    let _ = writeln!(out, "PIDFILE={}", quote("PIDFile", &pid_file)?);
    let _ = writeln!(out, "STOP_WAIT={}", STOP_WAIT_SECS);
    out.push('\n');

    out.push_str(RUNNING_FN);

    let start = exec_line(svc, ExecVerb::Start)?;
    out.push_str("do_start() {\n");
    out.push_str("    running && return 0\n");
    match (start, svc.service_type()) {
        (None, _) => {
            out.push_str("    echo \"$NAME: no ExecStart\" >&2\n");
            out.push_str("    return 6\n");
        }
        (Some(cmd), ServiceType::Simple) => {
            let _ = writeln!(out, "    {} </dev/null >/dev/null 2>&1 &", cmd);
            out.push_str("    echo $! >\"$PIDFILE\" || { kill $! 2>/dev/null; return 1; }\n");
            out.push_str("    return 0\n");
        }
        (Some(cmd), ServiceType::Exec) => {
            let _ = writeln!(out, "    {} </dev/null >/dev/null 2>&1 &", cmd);
            out.push_str("    pid=$!\n");
            out.push_str("    echo $pid >\"$PIDFILE\" || { kill $pid 2>/dev/null; return 1; }\n");
            out.push_str("    sleep 1\n");
            out.push_str("    running && return 0\n");
            out.push_str("    rm -f \"$PIDFILE\"\n");
            out.push_str("    wait $pid\n");
            out.push_str("    rc=$?\n");
            out.push_str("    [ $rc -eq 0 ] && return 1\n");
            out.push_str("    return $rc\n");
        }
        (Some(cmd), ServiceType::Forking) => {
            let _ = writeln!(out, "    {} </dev/null || return 1", cmd);
            out.push_str("    n=0\n");
            out.push_str("    while [ ! -s \"$PIDFILE\" ] && [ $n -lt 50 ]; do\n");
            out.push_str("        sleep 0.1 2>/dev/null || sleep 1\n");
            out.push_str("        n=$((n + 1))\n");
            out.push_str("    done\n");
            out.push_str("    running\n");
        }
    }
    out.push_str("}\n\n");

    out.push_str("do_stop() {\n");
    out.push_str("    running || { rm -f \"$PIDFILE\"; return 0; }\n");
    out.push_str("    MAINPID=$(cat \"$PIDFILE\"); export MAINPID\n");
    if let Some(cmd) = exec_line(svc, ExecVerb::Stop)? {
        let _ = writeln!(out, "    {} </dev/null", cmd);
    }
    out.push_str(STOP_WAIT_BODY);
    out.push_str("}\n\n");

    out.push_str("do_reload() {\n");
    match exec_line(svc, ExecVerb::Reload)? {
        Some(cmd) => {
            out.push_str("    running || return 7\n");
            out.push_str("    MAINPID=$(cat \"$PIDFILE\"); export MAINPID\n");
            let _ = writeln!(out, "    {} </dev/null || return 1", cmd);
            out.push_str("    return 0\n");
        }
        None => {
            out.push_str("    return 3\n");
        }
    }
    out.push_str("}\n\n");

    out.push_str(DISPATCH);
    let _ = writeln!(out, "{}", BEGIN_EMBED);
    out.push_str(&unit);
    let _ = writeln!(out, "{}", END_EMBED);
    Ok(out)
}

const RUNNING_FN: &str = r#"running() {
    [ -f "$PIDFILE" ] || return 3
    pid=$(cat "$PIDFILE" 2>/dev/null)
    [ -n "$pid" ] || return 1
    kill -0 "$pid" 2>/dev/null || return 1
    # zombies still answer kill -0
    if [ -r "/proc/$pid/stat" ]; then
        case $(sed 's/^.*) //' "/proc/$pid/stat") in
            Z*) return 1 ;;
        esac
    fi
    return 0
}

"#;

const STOP_WAIT_BODY: &str = r#"    n=0
    while running; do
        if [ $n -eq 0 ]; then
            kill -TERM "$MAINPID" 2>/dev/null
        elif [ $n -ge $((STOP_WAIT * 10)) ]; then
            kill -KILL "$MAINPID" 2>/dev/null
            sleep 1
            running && return 1
            break
        fi
        sleep 0.1 2>/dev/null || sleep 1
        n=$((n + 1))
    done
    rm -f "$PIDFILE"
    return 0
"#;

const DISPATCH: &str = r#"case "$1" in
    start)
        do_start
        ;;
    stop)
        do_stop
        ;;
    restart)
        do_stop && do_start
        ;;
    try-restart)
        running || exit 0
        do_stop && do_start
        ;;
    reload)
        do_reload
        ;;
    force-reload)
        do_reload || { do_stop && do_start; }
        ;;
    status)
        running
        rc=$?
        case $rc in
            0) echo "$NAME is running" ;;
            1) echo "$NAME is dead but pid file exists" ;;
            *) echo "$NAME is not running" ;;
        esac
        exit $rc
        ;;
    show)
        sed -n '/^:<<SYSVKIT$/,/^SYSVKIT$/{//!p;}' "$0"
        ;;
    *)
        echo "usage: $0 {start|stop|restart|try-restart|reload|force-reload|status|show}" >&2
        exit 2
        ;;
esac
exit $?

"#;

/// Pull the embedded unit text back out of a generated script
pub fn extract_embedded(script: &str) -> Option<&str> {
    let mut offset = 0;
    let mut begin = None;
    for line in script.split_inclusive('\n') {
        let bare = line.strip_suffix('\n').unwrap_or(line);
        match begin {
            None if bare == BEGIN_EMBED => begin = Some(offset + line.len()),
            Some(start) if bare == END_EMBED => return Some(&script[start..offset]),
            _ => {}
        }
        offset += line.len();
    }
    None
}

/// Whether text looks like a script rather than a unit file
pub fn is_script(text: &str) -> bool {
    text.starts_with("#!")
}

/// The process umask, read without modifying it where the kernel allows
pub fn current_umask() -> u32 {
    if let Ok(status) = fs::read_to_string("/proc/self/status") {
        let mask = status
            .lines()
            .find_map(|l| l.strip_prefix("Umask:"))
            .and_then(|v| u32::from_str_radix(v.trim(), 8).ok());
        if let Some(mask) = mask {
            return mask;
        }
    }
    let old = nix::sys::stat::umask(Mode::from_bits_truncate(0o077));
    nix::sys::stat::umask(old);
    old.bits() as u32
}

static TEMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Write `contents` to `path` with `mode & !umask`, all or nothing
///
/// The data goes to a sibling temporary file which is renamed over `path`
/// only once complete.
pub fn write_file(path: &Path, contents: &str, mode: u32) -> Result<u32, ScriptError> {
    write_file_masked(path, contents, mode, current_umask())
}

pub(crate) fn write_file_masked(
    path: &Path,
    contents: &str,
    mode: u32,
    umask: u32,
) -> Result<u32, ScriptError> {
    let mode = mode & !umask & 0o777;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.set_permissions(fs::Permissions::from_mode(mode))?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    match result {
        Ok(()) => {
            log::debug!("wrote {} (mode {:04o})", path.display(), mode);
            Ok(mode)
        }
        Err(source) => {
            let _ = fs::remove_file(&tmp);
            Err(ScriptError::Write {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}
