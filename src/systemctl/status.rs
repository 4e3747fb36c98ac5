//! status and is-active

use super::{Dispatcher, Report, Verb};
use crate::sysvinit::{runlevel, InitScript, OutputMode, ScriptVerb};

/// LSB status code for a service that is not running
pub const LSB_NOT_RUNNING: i32 = 3;

impl Dispatcher {
    /// Succeeds if any of the services is running
    pub(super) async fn is_active(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut any = false;
        for script in scripts {
            let code = self.code(&mut report, Verb::IsActive, script, ScriptVerb::Status).await;
            any |= code == 0;
            report.line(self.quiet, if code == 0 { "active" } else { "inactive" });
        }
        report.code = if any { 0 } else { LSB_NOT_RUNNING };
        report
    }

    /// One `<name> is <enabled> and <active>` line per service
    pub(super) async fn status(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        let opts = self.opts.clone().output(OutputMode::Capture);

        for script in scripts {
            let enabled = if runlevel::is_enabled(&self.layout, script.name()) {
                "enabled"
            } else {
                "disabled"
            };

            match script.invoke(ScriptVerb::Status, &opts).await {
                Ok(outcome) => {
                    let active = match outcome.code {
                        0 => "active".to_string(),
                        LSB_NOT_RUNNING => "inactive".to_string(),
                        code => {
                            let text = outcome.stdout.trim();
                            if text.is_empty() {
                                format!("failed (status {})", code)
                            } else {
                                text.to_string()
                            }
                        }
                    };
                    report.line(
                        self.quiet,
                        format!("{} is {} and {}", script.name(), enabled, active),
                    );
                    codes.push(outcome.code);
                }
                Err(e) => {
                    report.error(Verb::Status, script.name(), &e);
                    report.line(
                        self.quiet,
                        format!("{} is {} and unknown", script.name(), enabled),
                    );
                    codes.push(1);
                }
            }
        }

        report.code = super::last_failure(codes);
        report
    }
}
