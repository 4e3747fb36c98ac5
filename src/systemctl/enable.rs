//! enable, disable and is-enabled

use super::{Dispatcher, Report};
use crate::sysvinit::{runlevel, InitScript};

impl Dispatcher {
    pub(super) fn enable(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            match runlevel::enable(&self.layout, script.name()) {
                Ok(created) => {
                    log::debug!("{}: {} link(s) created", script.name(), created.len());
                    codes.push(0);
                }
                Err(e) => {
                    report.errors.push(format!("enable: {}: {}", script.name(), e));
                    codes.push(1);
                }
            }
        }
        report.code = super::last_failure(codes);
        report
    }

    pub(super) fn disable(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            match runlevel::disable(&self.layout, script.name()) {
                Ok(removed) => {
                    log::debug!("{}: {} link(s) removed", script.name(), removed.len());
                    codes.push(0);
                }
                Err(e) => {
                    report.errors.push(format!("disable: {}: {}", script.name(), e));
                    codes.push(1);
                }
            }
        }
        report.code = super::last_failure(codes);
        report
    }

    /// Succeeds if any of the services is enabled
    pub(super) fn is_enabled(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut any = false;
        for script in scripts {
            let enabled = runlevel::is_enabled(&self.layout, script.name());
            any |= enabled;
            report.line(self.quiet, if enabled { "enabled" } else { "disabled" });
        }
        report.code = if any { 0 } else { 1 };
        report
    }
}
