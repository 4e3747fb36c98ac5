//! systemctl - systemd-style service control for SysV init systems
//!
//! Resolves each service to its `/etc/init.d` script and runs the verb
//! against it. Nothing is kept between invocations.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sysvkit::layout::Layout;
use sysvkit::systemctl::{Dispatcher, Report, Verb, SYSTEMCTL_VERSION};
use sysvkit::sysvinit::{InvokeOptions, OutputMode};
use sysvkit::units::parse_duration;

/// sysexits.h EX_USAGE (not exported by libc on Linux).
const EX_USAGE: u8 = 64;

#[derive(Parser)]
#[command(name = "systemctl")]
#[command(about = "Control SysV init services with systemctl verbs")]
#[command(disable_version_flag = true)]
struct Args {
    /// Operate on services installed under this root
    #[arg(long, default_value = "/")]
    root: PathBuf,

    /// Only report errors
    #[arg(short, long)]
    quiet: bool,

    /// Log what is being run
    #[arg(short, long)]
    verbose: bool,

    /// Log debugging detail
    #[arg(short, long)]
    debug: bool,

    /// Write report lines to a file instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Per-script time limit (e.g. 90s, 500ms, 2min)
    #[arg(long, default_value = "90s", value_parser = parse_timeout)]
    timeout: std::time::Duration,

    /// Print version and exit
    #[arg(long)]
    version: bool,

    /// enable, disable, is-enabled, is-active, status, start, stop, restart,
    /// try-restart, reload, reload-or-restart, try-reload-or-restart, show,
    /// daemon-reload
    verb: Option<String>,

    /// Service names, with or without the .service suffix
    services: Vec<String>,
}

fn parse_timeout(s: &str) -> Result<std::time::Duration, String> {
    parse_duration(s).ok_or_else(|| format!("invalid duration '{}'", s))
}

fn usage(msg: impl std::fmt::Display) -> ExitCode {
    eprintln!("systemctl: {}", msg);
    ExitCode::from(EX_USAGE)
}

fn write_report(report: &Report, output: Option<&PathBuf>) -> std::io::Result<()> {
    let mut text = String::new();
    for line in &report.lines {
        text.push_str(line);
        text.push('\n');
    }
    match output {
        Some(path) => std::fs::write(path, text),
        None => std::io::stdout().write_all(text.as_bytes()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => {
            // --help
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EX_USAGE);
        }
    };

    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if args.version {
        println!("systemctl {} (sysvkit {})", SYSTEMCTL_VERSION, env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let Some(verb_arg) = args.verb.as_deref() else {
        return usage("missing command");
    };
    let Some(verb) = Verb::parse(verb_arg) else {
        return usage(format!("unknown command '{}'", verb_arg));
    };

    let layout = Layout::new(&args.root);
    let opts = InvokeOptions::new(&layout)
        .timeout(args.timeout)
        .output(OutputMode::Discard)
        .stderr(args.verbose || args.debug);
    let dispatcher = Dispatcher::new(layout, opts).quiet(args.quiet);

    let report = match dispatcher.run(verb, &args.services).await {
        Ok(report) => report,
        Err(e) if e.is_usage() => return usage(e),
        Err(e) => {
            eprintln!("systemctl: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for err in &report.errors {
        eprintln!("systemctl: {}", err);
    }
    if let Err(e) = write_report(&report, args.output.as_ref()) {
        eprintln!("systemctl: failed to write output: {}", e);
        return ExitCode::FAILURE;
    }

    // Exit statuses are 0..=255; anything else is reported as a failure
    match u8::try_from(report.code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
