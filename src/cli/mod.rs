//! Command-line interface for rmc-run.
//!
//! Provides commands for running a script, checking the environment,
//! installing the package, and showing the resolved configuration.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{self, Overrides, ResolvedConfig};
use crate::core::{
    AlwaysConsent, CommandSpec, ConsentProvider, DependencyInstaller, EnvironmentProbe,
    NeverConsent, NullObserver, RunWorkflow, WorkflowObserver, WorkflowState,
};
use crate::domain::{RunRequest, Stage, StageResult, WorkflowOutcome};
use crate::process::SystemProcessRunner;

pub mod consent;
pub mod render;

use consent::TerminalConsent;
use render::{JsonLinesObserver, TerminalObserver};

/// Exit code for a path that is not a runnable script
const EXIT_INVALID_REQUEST: u8 = 2;

/// rmc-run - run RenzMC scripts, installing the renzmc package on demand
#[derive(Parser, Debug)]
#[command(name = "rmc-run")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub toolchain: ToolchainArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Toolchain overrides, from flags or the environment
#[derive(Args, Debug, Default)]
pub struct ToolchainArgs {
    /// Config file to use instead of discovering .rmc-run/config.yaml
    #[arg(long, global = true, env = "RMC_RUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Runtime interpreter command (e.g. "python3")
    #[arg(long, global = true, env = "RMC_RUN_RUNTIME", value_parser = parse_command)]
    pub runtime: Option<CommandSpec>,

    /// Package manager command (e.g. "python3 -m pip")
    #[arg(long, global = true, env = "RMC_RUN_PACKAGE_MANAGER", value_parser = parse_command)]
    pub package_manager: Option<CommandSpec>,

    /// Launcher command that runs a script
    #[arg(long, global = true, env = "RMC_RUN_LAUNCHER", value_parser = parse_command)]
    pub launcher: Option<CommandSpec>,

    /// Package providing the launcher
    #[arg(long, global = true, env = "RMC_RUN_PACKAGE")]
    pub package: Option<String>,

    /// Resolve the package manager through the shell
    #[arg(
        long,
        global = true,
        env = "RMC_RUN_PACKAGE_MANAGER_SHELL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub package_manager_shell: Option<bool>,

    /// Milliseconds a canceled process gets before it is killed
    #[arg(long, global = true, env = "RMC_RUN_CANCEL_GRACE_MS")]
    pub cancel_grace_ms: Option<u64>,
}

impl ToolchainArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            runtime: self.runtime.clone(),
            package_manager: self.package_manager.clone(),
            launcher: self.launcher.clone(),
            package: self.package.clone(),
            package_manager_shell: self.package_manager_shell,
            cancel_grace_ms: self.cancel_grace_ms,
        }
    }
}

fn parse_command(value: &str) -> Result<CommandSpec, String> {
    CommandSpec::parse(value).ok_or_else(|| "command must not be empty".to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a RenzMC script, installing the package first if needed
    Run {
        /// Script to run (.rmc or .renzmc)
        file: PathBuf,

        /// Install a missing package without asking
        #[arg(short, long, conflicts_with = "no_install")]
        yes: bool,

        /// Never install a missing package
        #[arg(long)]
        no_install: bool,

        /// Write the transcript as JSON lines on stdout
        #[arg(long)]
        json: bool,
    },

    /// Check that the runtime and the package are available
    Doctor,

    /// Install the package
    Install {
        /// Write the transcript as JSON lines on stdout
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration
    Config,
}

/// How to answer the install question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentMode {
    Ask,
    Always,
    Never,
}

impl ConsentMode {
    fn from_flags(yes: bool, no_install: bool) -> Self {
        match (yes, no_install) {
            (true, _) => ConsentMode::Always,
            (_, true) => ConsentMode::Never,
            _ => ConsentMode::Ask,
        }
    }

    fn provider(self) -> Box<dyn ConsentProvider> {
        match self {
            ConsentMode::Ask => Box::new(TerminalConsent),
            ConsentMode::Always => Box::new(AlwaysConsent),
            ConsentMode::Never => Box::new(NeverConsent),
        }
    }
}

/// Drive `future` to completion on a fresh runtime
///
/// The runtime is shut down without joining blocking tasks: a consent prompt
/// abandoned by Ctrl-C stays parked in a stdin read until a line arrives.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<ExitCode> {
        let config = config::load_config(self.toolchain.config.as_deref(), &self.toolchain.overrides())?;

        match self.command {
            Commands::Run {
                file,
                yes,
                no_install,
                json,
            } => run_script(&config, &file, ConsentMode::from_flags(yes, no_install), json).await,
            Commands::Doctor => doctor(&config).await,
            Commands::Install { json } => install_package(&config, json).await,
            Commands::Config => show_config(&config),
        }
    }
}

fn runner(config: &ResolvedConfig) -> Arc<SystemProcessRunner> {
    Arc::new(SystemProcessRunner::new().with_termination_grace(config.cancel_grace))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping");
            token.cancel();
        }
    });
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Run a script through the full workflow
async fn run_script(
    config: &ResolvedConfig,
    file: &Path,
    consent: ConsentMode,
    json: bool,
) -> Result<ExitCode> {
    let request = match RunRequest::validated(file) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("[{}]", e);
            return Ok(ExitCode::from(EXIT_INVALID_REQUEST));
        }
    };

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let workflow = RunWorkflow::new(runner(config), config.toolchain.clone());
    let consent = consent.provider();

    let mut observer: Box<dyn WorkflowObserver> = if json {
        Box::new(JsonLinesObserver::new(request.id(), std::io::stdout()))
    } else {
        Box::new(TerminalObserver::stdio(
            request.display_name(),
            config.toolchain.clone(),
        ))
    };
    let outcome = workflow
        .start_cancellable(&request, observer.as_mut(), consent.as_ref(), cancel)
        .await;

    Ok(exit_code(outcome.exit_code()))
}

/// Probe the environment and report what was found
async fn doctor(config: &ResolvedConfig) -> Result<ExitCode> {
    let toolchain = &config.toolchain;
    let probe = EnvironmentProbe::new(runner(config), toolchain.clone(), CancellationToken::new());
    let mut observer = NullObserver;

    if !probe.check_runtime(&mut observer).await {
        println!("Runtime:  {} not found", toolchain.runtime);
        println!("          Download Python from https://www.python.org/downloads/");
        return Ok(exit_code(WorkflowOutcome::RuntimeMissing.exit_code()));
    }
    println!("Runtime:  {} found", toolchain.runtime);

    if !probe.check_package(&toolchain.package, &mut observer).await {
        println!("Package:  {} not installed", toolchain.package);
        println!("          Install it with: {}", toolchain.install_hint());
        return Ok(ExitCode::FAILURE);
    }
    println!("Package:  {} installed", toolchain.package);
    println!("Launcher: {}", toolchain.launcher);

    Ok(ExitCode::SUCCESS)
}

/// Install the package directly, without running anything
async fn install_package(config: &ResolvedConfig, json: bool) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let installer = DependencyInstaller::new(runner(config), config.toolchain.clone(), cancel);
    let package = config.toolchain.package.clone();

    let mut observer: Box<dyn WorkflowObserver> = if json {
        Box::new(JsonLinesObserver::new(uuid::Uuid::new_v4(), std::io::stdout()))
    } else {
        Box::new(TerminalObserver::stdio(package.clone(), config.toolchain.clone()))
    };

    let outcome = install_only(&installer, &package, observer.as_mut()).await;
    Ok(exit_code(outcome.exit_code()))
}

/// A single Install stage reported like a full run
async fn install_only(
    installer: &DependencyInstaller,
    package: &str,
    observer: &mut dyn WorkflowObserver,
) -> WorkflowOutcome {
    observer.on_stage_started(Stage::Install);
    let result = installer.install(package, observer).await;
    observer.on_stage_finished(Stage::Install, &result);

    let outcome = install_outcome(result);
    observer.on_workflow_terminal(&outcome);
    outcome
}

fn install_outcome(result: StageResult) -> WorkflowOutcome {
    match WorkflowState::Installing.next(result) {
        WorkflowState::Finished(outcome) => outcome,
        _ => WorkflowOutcome::Succeeded,
    }
}

/// Show resolved configuration
fn show_config(config: &ResolvedConfig) -> Result<ExitCode> {
    let toolchain = &config.toolchain;

    println!("rmc-run configuration");
    println!();
    println!(
        "Config file: {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Toolchain:");
    println!("  Runtime:         {}", toolchain.runtime);
    println!("  Package manager: {}", toolchain.package_manager);
    println!("  Shell resolution: {}", toolchain.package_manager_shell);
    println!("  Launcher:        {}", toolchain.launcher);
    println!("  Package:         {}", toolchain.package);
    println!();
    println!("Commands:");
    println!("  {}", toolchain.runtime_version());
    println!("  {}", toolchain.package_info(&toolchain.package));
    println!("  {}", toolchain.install_hint());
    println!("  {}", toolchain.launch(Path::new("<script>")));
    println!();
    println!("Cancel grace: {}ms", config.cancel_grace.as_millis());

    Ok(ExitCode::SUCCESS)
}
