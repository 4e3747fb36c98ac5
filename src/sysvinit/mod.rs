//! SysV init side: generated scripts, runlevel links and script invocation

pub mod invoke;
pub mod runlevel;
pub mod script;

pub use invoke::{InitScript, InvokeError, InvokeOptions, Outcome, OutputMode, ScriptVerb};
pub use runlevel::{FileId, RunlevelError};
pub use script::{extract_embedded, render_script, render_unit, ScriptError};

use std::path::Path;

use crate::layout::Layout;
use crate::units::ServiceDescriptor;

/// Generate the init script for `svc` and write it to `path`
pub fn convert(
    svc: &ServiceDescriptor,
    layout: &Layout,
    path: &Path,
) -> Result<InitScript, ScriptError> {
    let pid_file = svc
        .pid_file()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| layout.default_pid_file(svc.name()));
    let text = render_script(svc, &pid_file)?;
    let mode = script::write_file(path, &text, script::SCRIPT_MODE)?;
    log::info!("generated {} (mode {:04o})", path.display(), mode);
    Ok(InitScript::new(svc.name().clone(), path))
}

/// Write the canonical unit text of `svc` to `path`, without execute bits
pub fn show_to_file(svc: &ServiceDescriptor, path: &Path) -> Result<(), ScriptError> {
    let text = render_unit(svc)?;
    script::write_file(path, &text, script::UNIT_MODE)?;
    Ok(())
}
