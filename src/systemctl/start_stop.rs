//! start, stop, restart and try-restart
//!
//! start and stop ask the script for its status first and do nothing when
//! the service is already in the requested state.

use super::{Dispatcher, Report, Verb};
use crate::sysvinit::{InitScript, ScriptVerb};

impl Dispatcher {
    pub(super) async fn start(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            let status = self.code(&mut report, Verb::Start, script, ScriptVerb::Status).await;
            let code = if status == 0 {
                log::info!("{} is already running", script.name());
                0
            } else {
                self.code(&mut report, Verb::Start, script, ScriptVerb::Start).await
            };
            codes.push(code);
        }
        report.code = super::last_failure(codes);
        report
    }

    pub(super) async fn stop(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            let status = self.code(&mut report, Verb::Stop, script, ScriptVerb::Status).await;
            let code = if status != 0 {
                log::info!("{} is not running", script.name());
                0
            } else {
                self.code(&mut report, Verb::Stop, script, ScriptVerb::Stop).await
            };
            codes.push(code);
        }
        report.code = super::last_failure(codes);
        report
    }

    pub(super) async fn restart(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            codes.push(self.code(&mut report, Verb::Restart, script, ScriptVerb::Restart).await);
        }
        report.code = super::last_failure(codes);
        report
    }

    pub(super) async fn try_restart(&self, scripts: &[InitScript]) -> Report {
        let mut report = Report::default();
        let mut codes = Vec::new();
        for script in scripts {
            let status = self.code(&mut report, Verb::TryRestart, script, ScriptVerb::Status).await;
            let code = if status != 0 {
                0
            } else {
                self.code(&mut report, Verb::TryRestart, script, ScriptVerb::Restart).await
            };
            codes.push(code);
        }
        report.code = super::last_failure(codes);
        report
    }
}
