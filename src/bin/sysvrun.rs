//! sysvrun - convert, inspect and run systemd units without systemd

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sysvkit::layout::Layout;
use sysvkit::sysvrun::{Action, Destination, Sysvrun};
use sysvkit::units::parse_duration;

/// sysexits.h EX_USAGE (not exported by libc on Linux).
const EX_USAGE: u8 = 64;

#[derive(Parser)]
#[command(name = "sysvrun")]
#[command(about = "Convert systemd service units to SysV init scripts")]
#[command(version)]
struct Args {
    /// Operate under this root directory
    #[arg(long, default_value = "/")]
    root: PathBuf,

    /// Read the unit from this file (a unit file or a generated init script)
    #[arg(long)]
    unit_file: Option<PathBuf>,

    /// Where convert/show write their result; "-" for standard output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Time limit for commands run by start/stop/reload (e.g. 90s)
    #[arg(long, default_value = "90s", value_parser = parse_timeout)]
    timeout: std::time::Duration,

    /// Only report errors
    #[arg(short, long)]
    quiet: bool,

    /// Log what is being done
    #[arg(short, long)]
    verbose: bool,

    /// Log debugging detail
    #[arg(short, long)]
    debug: bool,

    /// Service name, with or without the .service suffix
    service: String,

    /// convert, show, start, stop, reload, restart or status
    #[arg(value_parser = parse_action)]
    action: Action,
}

fn parse_timeout(s: &str) -> Result<std::time::Duration, String> {
    parse_duration(s).ok_or_else(|| format!("invalid duration '{}'", s))
}

fn parse_action(s: &str) -> Result<Action, String> {
    Action::parse(s).ok_or_else(|| format!("unknown action '{}'", s))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => {
            // --help / --version
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

    let tool = Sysvrun::new(Layout::new(&args.root))
        .unit_file(args.unit_file)
        .destination(Destination::from_arg(args.output.as_deref()))
        .timeout(args.timeout);

    let mut stdout = std::io::stdout().lock();
    match tool.run(&args.service, args.action, &mut stdout).await {
        Ok(code) => match u8::try_from(code) {
            Ok(code) => ExitCode::from(code),
            Err(_) => ExitCode::FAILURE,
        },
        Err(e) => {
            eprintln!("sysvrun: {} {}: {}", args.service, args.action, e);
            ExitCode::FAILURE
        }
    }
}
