//! Integration tests for unit conversion
//!
//! Generated scripts are executed for real with /bin/sh, against a scratch
//! root whose executables mirror the host ones the units name.

use std::fs;
use std::process::Command;

use sysvkit::layout::Layout;
use sysvkit::systemctl::{Dispatcher, Verb};
use sysvkit::sysvinit::{self, InitScript, InvokeOptions, OutputMode, ScriptVerb};
use sysvkit::sysvrun::{Action, Destination, Sysvrun};
use sysvkit::units::{parse_unit, ServiceName};

const SLEEPER: &str = r#"
[Unit]
Description=Sleeps for a while

[Service]
Type=simple
ExecStart=/bin/sleep 300
Environment="GREETING=hello world"

[Install]
WantedBy=multi-user.target
"#;

fn fixture() -> (tempfile::TempDir, Layout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path());
    for bin in ["bin/sleep", "bin/sh", "bin/false"] {
        let path = dir.path().join(bin);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
    }
    fs::create_dir_all(layout.init_dir()).unwrap();
    fs::create_dir_all(layout.runtime_dir()).unwrap();
    fs::create_dir_all(layout.unit_dir()).unwrap();
    for n in 0..=6 {
        fs::create_dir_all(layout.rc_dir(n)).unwrap();
    }
    (dir, layout)
}

fn install(layout: &Layout, name: &str, unit: &str) -> InitScript {
    let name = ServiceName::parse(name).unwrap();
    let svc = parse_unit(&name, unit, layout).unwrap();
    sysvinit::convert(&svc, layout, &layout.init_script(&name)).unwrap()
}

#[tokio::test]
async fn test_generated_script_lifecycle() {
    let (_dir, layout) = fixture();
    let script = install(&layout, "sleeper", SLEEPER);
    let opts = InvokeOptions::new(&layout);

    assert_eq!(script.invoke(ScriptVerb::Status, &opts).await.unwrap().code, 3);
    assert_eq!(script.invoke(ScriptVerb::Start, &opts).await.unwrap().code, 0);
    assert_eq!(script.invoke(ScriptVerb::Status, &opts).await.unwrap().code, 0);
    // Reload without ExecReload is unimplemented
    assert_eq!(script.invoke(ScriptVerb::Reload, &opts).await.unwrap().code, 3);
    assert_eq!(script.invoke(ScriptVerb::Stop, &opts).await.unwrap().code, 0);
    assert_eq!(script.invoke(ScriptVerb::Status, &opts).await.unwrap().code, 3);
    assert!(!layout.runtime_dir().join("sleeper.pid").exists());
}

#[tokio::test]
async fn test_generated_script_shows_embedded_unit() {
    let (_dir, layout) = fixture();
    let script = install(&layout, "sleeper", SLEEPER);
    let opts = InvokeOptions::new(&layout).output(OutputMode::Capture);
    let outcome = script.invoke(ScriptVerb::Show, &opts).await.unwrap();
    assert_eq!(outcome.code, 0);

    let name = ServiceName::parse("sleeper").unwrap();
    let svc = parse_unit(&name, SLEEPER, &layout).unwrap();
    assert_eq!(outcome.stdout, sysvinit::render_unit(&svc).unwrap());
}

#[tokio::test]
async fn test_generated_script_usage_error() {
    let (_dir, layout) = fixture();
    let script = install(&layout, "sleeper", SLEEPER);
    let status = Command::new(script.path()).arg("bogus").status().unwrap();
    assert_eq!(status.code(), Some(2));
}

#[tokio::test]
async fn test_exec_type_reports_immediate_exit() {
    let (_dir, layout) = fixture();
    let script = install(&layout, "broken", "[Service]\nType=exec\nExecStart=/bin/false\n");
    let opts = InvokeOptions::new(&layout);
    assert_ne!(script.invoke(ScriptVerb::Start, &opts).await.unwrap().code, 0);
    assert_eq!(script.invoke(ScriptVerb::Status, &opts).await.unwrap().code, 3);
}

/// Poll for a condition that a backgrounded service makes true shortly
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    false
}

/// Whether a live process runs exactly `argv`
fn process_running(argv: &[&str]) -> bool {
    let wanted: String = argv.iter().map(|a| format!("{}\0", a)).collect();
    fs::read_dir("/proc")
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().chars().all(|c| c.is_ascii_digit()))
        .any(|e| fs::read_to_string(e.path().join("cmdline")).is_ok_and(|c| c == wanted))
}

#[tokio::test]
async fn test_unit_environment_stays_out_of_script() {
    let (dir, layout) = fixture();
    let elsewhere = dir.path().join("elsewhere.pid");
    let unit = format!(
        "[Service]\n\
         ExecStart=/bin/sh -c 'echo \"$GREETING\" > greeting; exec /bin/sleep 300'\n\
         Environment=PATH=/opt/app/bin GREETING=hi\n\
         Environment=PIDFILE={}\n",
        elsewhere.display()
    );
    let script = install(&layout, "sleeper", &unit);
    let opts = InvokeOptions::new(&layout);

    assert_eq!(script.invoke(ScriptVerb::Start, &opts).await.unwrap().code, 0);
    assert_eq!(script.invoke(ScriptVerb::Status, &opts).await.unwrap().code, 0);
    assert!(layout.runtime_dir().join("sleeper.pid").exists());
    assert!(!elsewhere.exists());

    // The service itself sees the variables
    let greeting = dir.path().join("greeting");
    assert!(eventually(|| fs::read_to_string(&greeting).is_ok_and(|g| g == "hi\n")).await);

    assert_eq!(script.invoke(ScriptVerb::Stop, &opts).await.unwrap().code, 0);
    assert_eq!(script.invoke(ScriptVerb::Status, &opts).await.unwrap().code, 3);
}

#[tokio::test]
async fn test_start_fails_when_pid_file_cannot_be_written() {
    let (_dir, layout) = fixture();
    fs::remove_dir(layout.runtime_dir()).unwrap();
    let script = install(&layout, "orphan", "[Service]\nExecStart=/bin/sleep 317\n");
    let opts = InvokeOptions::new(&layout);

    assert_ne!(script.invoke(ScriptVerb::Start, &opts).await.unwrap().code, 0);
    assert_eq!(script.invoke(ScriptVerb::Status, &opts).await.unwrap().code, 3);
    // The untracked daemon was not left behind
    assert!(eventually(|| !process_running(&["/bin/sleep", "317"])).await);
}

#[tokio::test]
async fn test_reload_runs_exec_reload_with_mainpid() {
    let (dir, layout) = fixture();
    let unit = "[Service]\nExecStart=/bin/sleep 300\n\
                ExecReload=/bin/sh -c 'echo $0 > reloaded' $MAINPID\n";
    let script = install(&layout, "sleeper", unit);
    let opts = InvokeOptions::new(&layout);

    // Not running
    assert_eq!(script.invoke(ScriptVerb::Reload, &opts).await.unwrap().code, 7);

    script.invoke(ScriptVerb::Start, &opts).await.unwrap();
    assert_eq!(script.invoke(ScriptVerb::Reload, &opts).await.unwrap().code, 0);
    let pid = fs::read_to_string(layout.runtime_dir().join("sleeper.pid")).unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("reloaded")).unwrap(), pid);
    script.invoke(ScriptVerb::Stop, &opts).await.unwrap();
}

#[tokio::test]
async fn test_systemctl_over_generated_scripts() {
    let (_dir, layout) = fixture();
    install(&layout, "sleeper", SLEEPER);
    let d = Dispatcher::new(layout.clone(), InvokeOptions::new(&layout));
    let svc = vec!["sleeper.service".to_string()];

    d.run(Verb::Enable, &svc).await.unwrap();
    assert_eq!(d.run(Verb::Start, &svc).await.unwrap().code, 0);
    let report = d.run(Verb::Status, &svc).await.unwrap();
    assert_eq!(report.lines, vec!["sleeper is enabled and active".to_string()]);
    assert_eq!(d.run(Verb::Stop, &svc).await.unwrap().code, 0);
    assert_eq!(d.run(Verb::IsActive, &svc).await.unwrap().code, 3);
}

#[tokio::test]
async fn test_show_of_converted_script_round_trips() {
    let (_dir, layout) = fixture();
    fs::write(layout.unit_dir().join("sleeper.service"), SLEEPER).unwrap();

    let mut direct = Vec::new();
    Sysvrun::new(layout.clone())
        .run("sleeper", Action::Show, &mut direct)
        .await
        .unwrap();

    Sysvrun::new(layout.clone())
        .run("sleeper", Action::Convert, &mut Vec::<u8>::new())
        .await
        .unwrap();
    let name = ServiceName::parse("sleeper").unwrap();
    let mut embedded = Vec::new();
    Sysvrun::new(layout.clone())
        .unit_file(Some(layout.init_script(&name)))
        .run("sleeper", Action::Show, &mut embedded)
        .await
        .unwrap();

    assert_eq!(direct, embedded);
}

#[tokio::test]
async fn test_show_to_file() {
    let (dir, layout) = fixture();
    fs::write(layout.unit_dir().join("sleeper.service"), SLEEPER).unwrap();
    let out = dir.path().join("sleeper.txt");
    Sysvrun::new(layout)
        .destination(Destination::File(out.clone()))
        .run("sleeper", Action::Show, &mut Vec::<u8>::new())
        .await
        .unwrap();
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("Environment=GREETING="));
    assert!(text.ends_with("[Install]\nWantedBy=multi-user.target\n"));
}

#[test]
fn test_binary_rejects_bad_type() {
    let (dir, layout) = fixture();
    fs::write(
        layout.unit_dir().join("bad.service"),
        "[Service]\nType=notify\nExecStart=/bin/sleep 1\n",
    )
    .unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_sysvrun"))
        .arg("--root")
        .arg(dir.path())
        .args(["bad", "convert"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Type"));
    assert!(!layout.init_dir().join("bad").exists());
}

#[test]
fn test_binary_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_sysvrun"))
        .args(["foo", "frobnicate"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(64));
}
