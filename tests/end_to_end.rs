//! End-to-End Tests
//!
//! Runs the workflow with real subprocesses. The interpreter, package
//! manager and launcher are small shell scripts in a temp directory.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use rmc_run::core::{AlwaysConsent, CommandSpec, NeverConsent, RecordingObserver, RunWorkflow, Toolchain};
use rmc_run::domain::{FailureCode, OutputStream, RunRequest, Stage, WorkflowOutcome};
use rmc_run::process::SystemProcessRunner;

struct FakeEnvironment {
    dir: TempDir,
}

impl FakeEnvironment {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("installed");

        write(dir.path(), "python.sh", "echo 'Python 3.12.1'\n");
        write(
            dir.path(),
            "pip.sh",
            &format!(
                "case \"$1\" in\n\
                 show) [ -f '{marker}' ] ;;\n\
                 install) echo \"Successfully installed $2\"; touch '{marker}' ;;\n\
                 *) exit 2 ;;\n\
                 esac\n",
                marker = marker.display()
            ),
        );
        write(dir.path(), "renzmc.sh", "echo \"hello from $1\"\n");
        write(dir.path(), "demo.rmc", "tampilkan \"hello\"\n");

        Self { dir }
    }

    fn mark_installed(&self) {
        std::fs::write(self.dir.path().join("installed"), "").unwrap();
    }

    fn script(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn toolchain(&self) -> Toolchain {
        Toolchain {
            runtime: CommandSpec::new("sh").arg(self.script("python.sh").display().to_string()),
            package_manager: CommandSpec::new("sh").arg(self.script("pip.sh").display().to_string()),
            launcher: CommandSpec::new("sh").arg(self.script("renzmc.sh").display().to_string()),
            ..Default::default()
        }
    }

    fn request(&self) -> RunRequest {
        RunRequest::validated(self.script("demo.rmc")).unwrap()
    }
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

fn workflow(toolchain: Toolchain) -> RunWorkflow {
    RunWorkflow::new(Arc::new(SystemProcessRunner::new()), toolchain)
}

#[tokio::test]
async fn test_installed_package_runs_script() {
    let env = FakeEnvironment::new();
    env.mark_installed();
    let request = env.request();
    let mut observer = RecordingObserver::new();

    let outcome = workflow(env.toolchain())
        .start(&request, &mut observer, &NeverConsent)
        .await;

    assert_eq!(outcome, WorkflowOutcome::Succeeded);
    let stdout = observer.output(Stage::Execute, OutputStream::Stdout);
    assert_eq!(
        String::from_utf8(stdout).unwrap(),
        format!("hello from {}\n", request.path().display())
    );
    assert_eq!(
        observer.output(Stage::ProbeRuntime, OutputStream::Stdout),
        b"Python 3.12.1\n"
    );
}

#[tokio::test]
async fn test_missing_package_is_installed_then_run() {
    let env = FakeEnvironment::new();
    let mut observer = RecordingObserver::new();

    let outcome = workflow(env.toolchain())
        .start(&env.request(), &mut observer, &AlwaysConsent)
        .await;

    assert_eq!(outcome, WorkflowOutcome::Succeeded);
    assert_eq!(
        observer.output(Stage::Install, OutputStream::Stdout),
        b"Successfully installed renzmc\n"
    );
    assert!(env.script("installed").exists());
    assert_eq!(
        observer.stages_started(),
        vec![
            Stage::ProbeRuntime,
            Stage::ProbePackage,
            Stage::Consent,
            Stage::Install,
            Stage::ProbePackage,
            Stage::Execute,
        ]
    );
}

#[tokio::test]
async fn test_declined_install_leaves_environment_untouched() {
    let env = FakeEnvironment::new();
    let mut observer = RecordingObserver::new();

    let outcome = workflow(env.toolchain())
        .start(&env.request(), &mut observer, &NeverConsent)
        .await;

    assert_eq!(outcome, WorkflowOutcome::PackageMissingDeclined);
    assert!(!env.script("installed").exists());
}

#[tokio::test]
async fn test_missing_runtime_binary() {
    let env = FakeEnvironment::new();
    let toolchain = Toolchain {
        runtime: CommandSpec::new(env.script("no-such-python").display().to_string()),
        ..env.toolchain()
    };
    let mut observer = RecordingObserver::new();

    let outcome = workflow(toolchain)
        .start(&env.request(), &mut observer, &AlwaysConsent)
        .await;

    assert_eq!(outcome, WorkflowOutcome::RuntimeMissing);
    assert_eq!(outcome.exit_code(), 127);
    assert_eq!(observer.stages_started(), vec![Stage::ProbeRuntime]);
}

#[tokio::test]
async fn test_script_exit_code_is_reported() {
    let env = FakeEnvironment::new();
    env.mark_installed();
    write(env.dir.path(), "renzmc.sh", "echo 'boom' >&2\nexit 3\n");
    let mut observer = RecordingObserver::new();

    let outcome = workflow(env.toolchain())
        .start(&env.request(), &mut observer, &NeverConsent)
        .await;

    assert_eq!(outcome, WorkflowOutcome::ExecuteFailed(FailureCode::Code(3)));
    assert_eq!(outcome.exit_code(), 3);
    assert_eq!(
        observer.output(Stage::Execute, OutputStream::Stderr),
        b"boom\n"
    );
}
