//! reload and its restart fallbacks, plus show

use super::{Dispatcher, Report, Verb};
use crate::sysvinit::{InitScript, OutputMode, ScriptVerb};

impl Dispatcher {
    pub(super) async fn reload(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            codes.push(self.code(&mut report, Verb::Reload, script, ScriptVerb::Reload).await);
        }
        report.code = super::last_failure(codes);
        report
    }

    pub(super) async fn reload_or_restart(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            let verb = Verb::ReloadOrRestart;
            let code = match self.code(&mut report, verb, script, ScriptVerb::Reload).await {
                0 => 0,
                failed => {
                    log::info!("{}: reload returned {}, restarting", script.name(), failed);
                    self.code(&mut report, verb, script, ScriptVerb::Restart).await
                }
            };
            codes.push(code);
        }
        report.code = super::last_failure(codes);
        report
    }

    /// Reload a running service, restarting it if reload fails
    ///
    /// The restart result is final even when it fails too.
    pub(super) async fn try_reload_or_restart(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            let verb = Verb::TryReloadOrRestart;
            if self.code(&mut report, verb, script, ScriptVerb::Status).await != 0 {
                log::info!("{} is not running", script.name());
                codes.push(0);
                continue;
            }
            let code = match self.code(&mut report, verb, script, ScriptVerb::Reload).await {
                0 => 0,
                failed => {
                    log::info!("{}: reload returned {}, restarting", script.name(), failed);
                    self.code(&mut report, verb, script, ScriptVerb::Restart).await
                }
            };
            codes.push(code);
        }
        report.code = super::last_failure(codes);
        report
    }

    /// The embedded unit of each script, as the script prints it
    pub(super) async fn show(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        let opts = self.opts.clone().output(OutputMode::Capture);
        for script in scripts {
            match script.invoke(ScriptVerb::Show, &opts).await {
                Ok(outcome) => {
                    report.lines.extend(outcome.stdout.lines().map(str::to_string));
                    codes.push(outcome.code);
                }
                Err(e) => {
                    report.error(Verb::Show, script.name(), &e);
                    codes.push(1);
                }
            }
        }
        report.code = super::last_failure(codes);
        report
    }
}
